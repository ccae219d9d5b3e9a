pub mod handlers;
pub mod session;

/// Basic `local@domain.tld` shape check. Matches the original validation:
/// no whitespace or extra `@`, and the domain part must contain a dot.
pub fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => (local, domain),
        _ => return false,
    };
    if local.is_empty() || local.chars().any(char::is_whitespace) {
        return false;
    }
    if domain.chars().any(char::is_whitespace) {
        return false;
    }
    let mut dom = domain.rsplitn(2, '.');
    match (dom.next(), dom.next()) {
        (Some(tld), Some(name)) => !tld.is_empty() && !name.is_empty(),
        _ => false,
    }
}
