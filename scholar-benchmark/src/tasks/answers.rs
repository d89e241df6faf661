//! Answer extraction from raw model output and label-list parsing

use serde_json::Value;

use super::TaskKind;

/// Markers after which a reasoning model states its final answer
const REASONING_MARKERS: &[&str] = &["</think>", "</thought>", "<solution>"];

/// Markers introducing an answer when no reasoning block is present
const ANSWER_MARKERS: &[&str] = &["**답변:**", "**정답:**", "답변:", "정답:", "**Answer:**", "Answer:"];

/// Error produced when text is not a bracketed label list
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a label list at offset {offset}: {reason}")]
pub struct LabelParseError {
    pub offset: usize,
    pub reason: &'static str,
}

/// Parse a bracket-delimited, comma-separated list of labels.
///
/// Accepts single- or double-quoted labels (with backslash escapes) and bare
/// tokens, e.g. `['a', "b", c]`. Nothing is evaluated; anything outside this
/// grammar is rejected.
pub fn parse_label_list(text: &str) -> Result<Vec<String>, LabelParseError> {
    let chars: Vec<char> = text.chars().collect();
    let mut pos = 0;
    let err = |offset: usize, reason: &'static str| LabelParseError { offset, reason };

    skip_ws(&chars, &mut pos);
    if chars.get(pos) != Some(&'[') {
        return Err(err(pos, "expected '['"));
    }
    pos += 1;

    let mut labels = Vec::new();
    loop {
        skip_ws(&chars, &mut pos);
        match chars.get(pos) {
            None => return Err(err(pos, "unterminated list")),
            Some(']') => {
                pos += 1;
                break;
            }
            Some(&quote) if quote == '\'' || quote == '"' => {
                pos += 1;
                let mut label = String::new();
                loop {
                    match chars.get(pos) {
                        None => return Err(err(pos, "unterminated string")),
                        Some('\\') => {
                            let escaped = chars.get(pos + 1).ok_or(err(pos, "dangling escape"))?;
                            label.push(*escaped);
                            pos += 2;
                        }
                        Some(&c) if c == quote => {
                            pos += 1;
                            break;
                        }
                        Some(&c) => {
                            label.push(c);
                            pos += 1;
                        }
                    }
                }
                labels.push(label);
            }
            Some(_) => {
                let start = pos;
                while let Some(&c) = chars.get(pos) {
                    if c == ',' || c == ']' || c == '[' || c == '\'' || c == '"' {
                        break;
                    }
                    pos += 1;
                }
                let label: String = chars[start..pos].iter().collect::<String>().trim().to_string();
                if label.is_empty() {
                    return Err(err(start, "empty label"));
                }
                labels.push(label);
            }
        }

        skip_ws(&chars, &mut pos);
        match chars.get(pos) {
            Some(',') => pos += 1,
            Some(']') => {
                pos += 1;
                break;
            }
            _ => return Err(err(pos, "expected ',' or ']'")),
        }
    }

    skip_ws(&chars, &mut pos);
    if pos != chars.len() {
        return Err(err(pos, "trailing characters"));
    }
    Ok(labels)
}

fn skip_ws(chars: &[char], pos: &mut usize) {
    while chars.get(*pos).is_some_and(|c| c.is_whitespace()) {
        *pos += 1;
    }
}

/// Strip reasoning preamble and answer markers, keeping the final answer text
pub fn final_answer_text(raw: &str) -> String {
    let text = raw.trim();

    for marker in REASONING_MARKERS {
        if let Some(idx) = text.rfind(marker) {
            return text[idx + marker.len()..].trim().to_string();
        }
    }
    for marker in ANSWER_MARKERS {
        if let Some(idx) = text.rfind(marker) {
            return text[idx + marker.len()..].trim().to_string();
        }
    }
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Turn raw model output into the stored answer for a task kind
pub fn extract_answer(raw: &str, kind: TaskKind) -> Value {
    match kind {
        TaskKind::ShortAnswer | TaskKind::Summarization => {
            let text = raw.trim();
            let answer = if REASONING_MARKERS.iter().any(|m| text.contains(m)) {
                final_answer_text(text)
            } else {
                text.to_string()
            };
            Value::String(answer)
        }
        TaskKind::MultipleChoice => {
            let text = final_answer_text(raw);
            let letter = text
                .chars()
                .find(|c| c.is_alphanumeric())
                .map(|c| c.to_ascii_lowercase())
                .filter(|c| ('a'..='d').contains(c));
            Value::String(letter.map(String::from).unwrap_or_default())
        }
        TaskKind::MultipleSelect => {
            let text = final_answer_text(raw);
            let labels = match (text.find('['), text.rfind(']')) {
                (Some(start), Some(end)) if start < end => {
                    parse_label_list(&text[start..=end]).unwrap_or_default()
                }
                _ => text
                    .split(',')
                    .map(|s| s.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            };
            Value::Array(
                labels
                    .iter()
                    .filter_map(|label| label.trim().chars().next())
                    .map(|c| Value::String(c.to_lowercase().to_string()))
                    .collect(),
            )
        }
        TaskKind::TrueFalse => {
            let text = final_answer_text(raw).to_lowercase();
            let answer = if text.contains("참") || text.contains("true") || text.contains('1') {
                "1"
            } else if text.contains("거짓") || text.contains("false") || text.contains('0') {
                "0"
            } else {
                ""
            };
            Value::String(answer.to_string())
        }
    }
}

/// Whether a stored answer is usable: non-blank text or a non-empty list
pub fn is_valid_answer(answer: &Value) -> bool {
    match answer {
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Null => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_label_list_accepts_quoted_and_bare() {
        assert_eq!(parse_label_list("['a', 'c']").unwrap(), vec!["a", "c"]);
        assert_eq!(parse_label_list(r#" ["a" ,b, 'it\'s'] "#).unwrap(), vec!["a", "b", "it's"]);
        assert_eq!(parse_label_list("[]").unwrap(), Vec::<String>::new());
        assert_eq!(parse_label_list("['a',]").unwrap(), vec!["a"]);
    }

    #[test]
    fn test_parse_label_list_rejects_non_lists() {
        assert!(parse_label_list("a, c").is_err());
        assert!(parse_label_list("['a', 'c'").is_err());
        assert!(parse_label_list("['a'] + ['b']").is_err());
        assert!(parse_label_list("__import__('os')").is_err());
        assert!(parse_label_list("[['a']]").is_err());
    }

    #[test]
    fn test_final_answer_after_reasoning() {
        assert_eq!(final_answer_text("<think>hmm, maybe b</think>\n c "), "c");
        assert_eq!(final_answer_text("Some reasoning\n정답: b"), "b");
        assert_eq!(final_answer_text("first line\nsecond line\n"), "second line");
    }

    #[test]
    fn test_extract_multiple_choice() {
        assert_eq!(extract_answer("B) Mitochondria", TaskKind::MultipleChoice), json!("b"));
        assert_eq!(extract_answer("**c**", TaskKind::MultipleChoice), json!("c"));
        assert_eq!(extract_answer("none of these", TaskKind::MultipleChoice), json!(""));
    }

    #[test]
    fn test_extract_multiple_select() {
        assert_eq!(
            extract_answer("The answer is ['A) first', 'c) third']", TaskKind::MultipleSelect),
            json!(["a", "c"])
        );
        assert_eq!(extract_answer("a, d", TaskKind::MultipleSelect), json!(["a", "d"]));
        assert_eq!(extract_answer("", TaskKind::MultipleSelect), json!([]));
    }

    #[test]
    fn test_extract_true_false() {
        assert_eq!(extract_answer("True", TaskKind::TrueFalse), json!("1"));
        assert_eq!(extract_answer("거짓입니다", TaskKind::TrueFalse), json!("0"));
        assert_eq!(extract_answer("unsure", TaskKind::TrueFalse), json!(""));
    }

    #[test]
    fn test_is_valid_answer() {
        assert!(is_valid_answer(&json!("b")));
        assert!(!is_valid_answer(&json!("   ")));
        assert!(!is_valid_answer(&json!([])));
        assert!(is_valid_answer(&json!(["a"])));
    }
}
