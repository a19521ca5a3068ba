/// Split a command line on whitespace, keeping single-quoted spans intact.
///
/// Quote characters stay in the token: `echo 'a b' c` yields
/// `["echo", "'a b'", "c"]`. Runs of whitespace collapse, and an
/// unterminated quote extends to the end of the line.
pub fn split_unquoted_whitespace(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;

    for ch in line.chars() {
        if ch == '\'' {
            in_quote = !in_quote;
            current.push(ch);
        } else if ch.is_whitespace() && !in_quote {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}
