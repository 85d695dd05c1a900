/// Number of characters kept visible at each end of a masked value
const VISIBLE_CHARS: usize = 2;

/// Mask a login ID or email so it can appear in log lines.
///
/// Emails keep the first characters of the local part and the full domain:
/// `jane@example.com` becomes `ja**@example.com`. Anything else keeps the
/// first and last two characters: `12345678` becomes `12****78`.
pub fn mask_login_id(value: &str) -> String {
    let value = value.trim();
    if let Some((local, domain)) = value.split_once('@') {
        let kept: String = local.chars().take(VISIBLE_CHARS).collect();
        let hidden = local.chars().count().saturating_sub(VISIBLE_CHARS);
        return format!("{}{}@{}", kept, "*".repeat(hidden), domain);
    }

    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= VISIBLE_CHARS * 2 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..VISIBLE_CHARS].iter().collect();
    let tail: String = chars[chars.len() - VISIBLE_CHARS..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - VISIBLE_CHARS * 2), tail)
}
