use regex::Regex;

/// Pulls the value of a named hidden form field out of an HTML page.
pub trait HiddenFieldExtractor {
    fn extract(&self, html: &str, name: &str) -> Option<String>;
}

/// Matches `name="<field>" value="<token>"` in the raw markup.
///
/// Only the attribute order CAS renders is recognised, and an empty value
/// counts as missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexFieldExtractor;

impl HiddenFieldExtractor for RegexFieldExtractor {
    fn extract(&self, html: &str, name: &str) -> Option<String> {
        let pattern = format!(r#"name="{}"\s+value="([^"]+)""#, regex::escape(name));
        let re = Regex::new(&pattern).ok()?;

        re.captures(html)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().to_string())
    }
}
