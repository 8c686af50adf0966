//! Escaping for Telegram `MarkdownV2`.
//!
//! Every piece of user-supplied text must pass through [`escape_markdown`]
//! before it is interpolated into a message body.

const SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
    '\\',
];

/// Prefix every `MarkdownV2` special character with a backslash.
#[must_use]
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if SPECIAL.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Escape the target of an inline link, where only `)` and `\` are special.
#[must_use]
pub fn escape_link_url(url: &str) -> String {
    let mut escaped = String::with_capacity(url.len());
    for ch in url.chars() {
        if ch == ')' || ch == '\\' {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_every_special_character() {
        assert_eq!(escape_markdown("a_b*c"), "a\\_b\\*c");
        assert_eq!(escape_markdown("+7 (900) 000-00-00"), "\\+7 \\(900\\) 000\\-00\\-00");
        assert_eq!(escape_markdown("1.5!"), "1\\.5\\!");
        assert_eq!(escape_markdown("[x](y)"), "\\[x\\]\\(y\\)");
        assert_eq!(escape_markdown("c:\\tmp"), "c:\\\\tmp");
    }

    #[test]
    fn leaves_plain_text_alone() {
        assert_eq!(escape_markdown("Hello world 42"), "Hello world 42");
        assert_eq!(escape_markdown("Привет"), "Привет");
    }

    #[test]
    fn link_targets_escape_only_parens_and_backslash() {
        assert_eq!(escape_link_url("https://t.me/a_b"), "https://t.me/a_b");
        assert_eq!(escape_link_url("https://x.y/(1)"), "https://x.y/(1\\)");
    }
}
