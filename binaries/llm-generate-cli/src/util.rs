use std::io::Write;

pub fn process_prompt(raw_prompt: &str, prompt: &str) -> String {
    raw_prompt.replace("{{PROMPT}}", prompt)
}

/// Prints `words` followed by a space, without waiting for a newline.
pub fn print_words(words: &str) -> std::io::Result<()> {
    if words.is_empty() {
        return Ok(());
    }
    print!("{words} ");
    std::io::stdout().flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_prompt() {
        assert_eq!(
            process_prompt("Q: {{PROMPT}} A:", "how are you"),
            "Q: how are you A:"
        );
        assert_eq!(process_prompt("no placeholder", "x"), "no placeholder");
    }

    #[test]
    fn test_print_words_reports_flush_result() -> std::io::Result<()> {
        print_words("")?;
        print_words("hello")
    }
}
