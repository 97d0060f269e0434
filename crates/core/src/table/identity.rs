use crate::constants::ANONYMOUS_USER_ID;

/// The user id rows are read and written under: the signed-in user, or the
/// shared anonymous id when nobody is signed in.
pub fn resolve_user_id(signed_in: Option<&str>) -> String {
    match signed_in {
        Some(id) if !id.trim().is_empty() => id.to_string(),
        _ => ANONYMOUS_USER_ID.to_string(),
    }
}
