use serde::{Deserialize, Serialize};
use tracing::debug;

/// The model's answer to one question: a SQL query plus a short
/// human-readable explanation of what it computes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedQuery {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub explanation: String,
}

impl GeneratedQuery {
    fn with_default_explanation(mut self) -> Self {
        if self.explanation.trim().is_empty() {
            self.explanation = "No explanation provided.".to_string();
        }
        self
    }
}

/// Turns a raw model completion into a `GeneratedQuery`.
///
/// Models are asked for a JSON object but routinely wrap it in markdown
/// fences or answer with a bare SQL block instead, so this walks a chain
/// of progressively looser parses. A completion nothing can be extracted
/// from yields an empty query, which callers treat as a generation failure.
pub fn parse_generation_response(content: &str) -> GeneratedQuery {
    // 1. The whole completion is the JSON object
    if let Ok(parsed) = serde_json::from_str::<GeneratedQuery>(content) {
        return parsed.with_default_explanation();
    }

    // 2. JSON inside a ```json fence
    if let Some(inner) = fenced_block(content, "```json") {
        if let Ok(parsed) = serde_json::from_str::<GeneratedQuery>(&inner) {
            return parsed.with_default_explanation();
        }
    }

    // 3. The first {...} span that parses
    if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
        if end > start {
            if let Ok(parsed) = serde_json::from_str::<GeneratedQuery>(&content[start..=end]) {
                return parsed.with_default_explanation();
            }
        }
    }

    // 4. No JSON anywhere; fall back to bare SQL extraction
    let sql = extract_sql(content);
    if !sql.trim().is_empty() {
        debug!("Model answered with bare SQL instead of JSON");
        return GeneratedQuery {
            query: sql,
            explanation: "No explanation provided.".to_string(),
        };
    }

    GeneratedQuery {
        query: String::new(),
        explanation: "Could not parse the model response.".to_string(),
    }
}

/// Pulls a SQL statement out of a completion that ignored the JSON format.
pub fn extract_sql(content: &str) -> String {
    // Between ```sql and ``` markers
    if let Some(sql) = fenced_block(content, "```sql") {
        return sql;
    }

    // Between plain ``` markers
    if let Some(sql) = fenced_block(content, "```") {
        return sql;
    }

    // A line starting with a SQL keyword, collected to the end of the statement
    let sql_keywords = ["SELECT", "WITH"];
    let lines: Vec<&str> = content.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim().to_uppercase();
        if sql_keywords.iter().any(|kw| trimmed.starts_with(kw)) {
            let mut sql = line.trim().to_string();

            for next_line in lines.iter().skip(i + 1) {
                let next = next_line.trim();
                if next.starts_with("```") {
                    break;
                }
                sql.push(' ');
                sql.push_str(next);
                if next.ends_with(';') {
                    break;
                }
            }

            return sql.trim().to_string();
        }
    }

    String::new()
}

/// Content between an opening fence marker and the next closing ```.
fn fenced_block(content: &str, opening: &str) -> Option<String> {
    let start = content.find(opening)? + opening.len();
    let rest = &content[start..];
    let end = rest.find("```")?;
    let inner = rest[..end].trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let parsed = parse_generation_response(
            r#"{"query": "SELECT 1", "explanation": "returns one"}"#,
        );
        assert_eq!(parsed.query, "SELECT 1");
        assert_eq!(parsed.explanation, "returns one");
    }

    #[test]
    fn parses_json_inside_fence() {
        let content = "Here you go:\n```json\n{\"query\": \"SELECT region FROM sales\"}\n```";
        let parsed = parse_generation_response(content);
        assert_eq!(parsed.query, "SELECT region FROM sales");
        assert_eq!(parsed.explanation, "No explanation provided.");
    }

    #[test]
    fn parses_embedded_json_object() {
        let content = "Sure! {\"query\": \"SELECT 2\", \"explanation\": \"two\"} Hope that helps.";
        let parsed = parse_generation_response(content);
        assert_eq!(parsed.query, "SELECT 2");
        assert_eq!(parsed.explanation, "two");
    }

    #[test]
    fn falls_back_to_sql_fence() {
        let content = "```sql\nSELECT amount FROM orders;\n```";
        let parsed = parse_generation_response(content);
        assert_eq!(parsed.query, "SELECT amount FROM orders;");
    }

    #[test]
    fn falls_back_to_keyword_scan() {
        let content = "The query you need is\nSELECT region,\n  sum(amount)\nFROM sales;\nEnjoy!";
        let parsed = parse_generation_response(content);
        assert_eq!(parsed.query, "SELECT region, sum(amount) FROM sales;");
    }

    #[test]
    fn garbage_yields_empty_query() {
        let parsed = parse_generation_response("I cannot answer that.");
        assert!(parsed.query.is_empty());
    }
}
