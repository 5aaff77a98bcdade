// src/utils/html.rs

/// Clean post HTML using the ammonia library.
///
/// Safe formatting tags (<b>, <p>, <a>, ...) survive; scripts, iframes and
/// event-handler attributes are stripped before the body is stored.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_but_keeps_markup() {
        let cleaned = clean_html("<p>Hello <b>world</b></p><script>alert(1)</script>");
        assert_eq!(cleaned, "<p>Hello <b>world</b></p>");
    }
}
