//! Unified log format: [PulseBot][bot][component] key=value ...

const CONTENT_LOG_MAX_LEN: usize = 120;

/// Log prefix for a component (e.g. "telegram", "router", "cache").
#[inline]
pub fn prefix_component(component: &str) -> String {
    format!("[PulseBot][bot][{}]", component)
}

/// Truncate message content for logging (avoid huge dumps). The cut point backs up to a
/// char boundary so multibyte text never splits mid-character.
#[inline]
pub fn truncate_content(content: &str, max_len: usize) -> std::borrow::Cow<'_, str> {
    if content.len() <= max_len {
        std::borrow::Cow::Borrowed(content)
    } else {
        let cut = floor_char_boundary(content, max_len);
        std::borrow::Cow::Owned(format!("{}... ({} bytes)", &content[..cut], content.len()))
    }
}

/// Largest index <= `max` that lands on a char boundary of `s`.
pub fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut i = max;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[inline]
pub fn truncate_content_default(content: &str) -> std::borrow::Cow<'_, str> {
    truncate_content(content, CONTENT_LOG_MAX_LEN)
}
