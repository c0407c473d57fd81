// src/utils/html.rs

/// Sanitize authored rich text (prompts, stimuli, explanations) with a
/// whitelist: safe tags survive, script/iframe and event-handler
/// attributes are stripped. Question content is written by admins but
/// rendered into every student's page, so it is cleaned on write.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_but_keeps_markup() {
        let dirty = "<p>Solve for <b>x</b><script>alert(1)</script></p>";
        let clean = clean_html(dirty);
        assert!(clean.contains("<b>x</b>"));
        assert!(!clean.contains("script"));
    }
}
