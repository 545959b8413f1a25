use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Deserialize;

pub const WELCOME_TEMP_PASSWORD: &str = "Hello {{nameOrEmail}},\n\nWelcome aboard! Your temporary password is: {{tempPassword}}\n\nPlease sign in and change it immediately from your account settings.{{actionUrl?}}\n\nThanks,\nODC Auth Team";

pub const PASSWORD_RESET: &str = "Hi {{nameOrEmail}},\n\nUse this token to reset your password: {{resetToken}}\nReset here: {{actionUrl}}\nIf you didn't request this, please ignore this email.";

pub const VERIFY_EMAIL: &str = "Hello {{nameOrEmail}},\n\nVerify your email using this token: {{verificationToken}}\nVerify here: {{actionUrl}}";

/// Named default templates selectable over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TemplateKey {
    #[serde(rename = "welcomeTempPassword")]
    WelcomeTempPassword,
    #[serde(rename = "passwordReset")]
    PasswordReset,
    #[serde(rename = "verifyEmail")]
    VerifyEmail,
}

impl TemplateKey {
    pub fn text(self) -> &'static str {
        match self {
            TemplateKey::WelcomeTempPassword => WELCOME_TEMP_PASSWORD,
            TemplateKey::PasswordReset => PASSWORD_RESET,
            TemplateKey::VerifyEmail => VERIFY_EMAIL,
        }
    }
}

/// Whether a rendered body should be routed as HTML or plain text. Computed
/// once per message, never re-derived at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Text,
}

impl ContentKind {
    pub fn detect(content: &str) -> Self {
        let trimmed = content.trim();
        let is_html = trimmed.starts_with("<!DOCTYPE html")
            || trimmed.starts_with("<!doctype html")
            || trimmed.starts_with("<html")
            || (trimmed.contains("<html") && trimmed.contains("</html>"));
        if is_html {
            ContentKind::Html
        } else {
            ContentKind::Text
        }
    }
}

/// Two-pass substitution: `{{var?}}` optional blocks first (value prefixed
/// with a newline when present and non-empty, else nothing), then plain
/// `{{var}}` placeholders. Unknown variables render as empty string.
pub fn render(template: &str, variables: &HashMap<&str, String>) -> String {
    lazy_static! {
        static ref OPTIONAL_RE: Regex = Regex::new(r"\{\{(\w+)\?\}\}").unwrap();
        static ref VAR_RE: Regex = Regex::new(r"\{\{(.*?)\}\}").unwrap();
    }

    let with_optional = OPTIONAL_RE.replace_all(template, |caps: &Captures| {
        match variables.get(caps.get(1).unwrap().as_str()) {
            Some(value) if !value.is_empty() => format!("\n{value}"),
            _ => String::new(),
        }
    });

    VAR_RE
        .replace_all(&with_optional, |caps: &Captures| {
            let key = caps.get(1).unwrap().as_str().trim();
            variables.get(key).cloned().unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn substitutes_plain_variables() {
        let out = render("Hi {{name}}, token: {{token}}", &vars(&[("name", "Ana"), ("token", "t1")]));
        assert_eq!(out, "Hi Ana, token: t1");
    }

    #[test]
    fn tolerates_whitespace_inside_braces() {
        let out = render("Hi {{ name }}", &vars(&[("name", "Ana")]));
        assert_eq!(out, "Hi Ana");
    }

    #[test]
    fn unknown_variable_renders_empty() {
        let out = render("Hi {{name}}!", &vars(&[]));
        assert_eq!(out, "Hi !");
    }

    #[test]
    fn optional_block_prefixes_value_with_newline() {
        let out = render("Done.{{actionUrl?}}", &vars(&[("actionUrl", "https://x/reset")]));
        assert_eq!(out, "Done.\nhttps://x/reset");
    }

    #[test]
    fn optional_block_vanishes_when_absent_or_empty() {
        assert_eq!(render("Done.{{actionUrl?}}", &vars(&[])), "Done.");
        assert_eq!(
            render("Done.{{actionUrl?}}", &vars(&[("actionUrl", "")])),
            "Done."
        );
    }

    #[test]
    fn optional_pass_runs_before_plain_pass() {
        // Were the plain pass first, `{{url?}}` would never match.
        let out = render("{{url?}} / {{url}}", &vars(&[("url", "u")]));
        assert_eq!(out, "\nu / u");
    }

    #[test]
    fn default_templates_reference_their_variables() {
        assert!(WELCOME_TEMP_PASSWORD.contains("{{tempPassword}}"));
        assert!(WELCOME_TEMP_PASSWORD.contains("{{actionUrl?}}"));
        assert!(PASSWORD_RESET.contains("{{resetToken}}"));
        assert!(VERIFY_EMAIL.contains("{{verificationToken}}"));
    }

    #[test]
    fn detects_html_documents() {
        assert_eq!(
            ContentKind::detect("<!DOCTYPE html><html></html>"),
            ContentKind::Html
        );
        assert_eq!(
            ContentKind::detect("  <html><body>x</body></html>"),
            ContentKind::Html
        );
        assert_eq!(
            ContentKind::detect("prefix <html>x</html> suffix"),
            ContentKind::Html
        );
        assert_eq!(ContentKind::detect("Hello <b>world</b>"), ContentKind::Text);
        assert_eq!(ContentKind::detect("plain text"), ContentKind::Text);
    }

    #[test]
    fn template_key_deserializes_from_wire_names() {
        let key: TemplateKey = serde_json::from_str("\"passwordReset\"").unwrap();
        assert_eq!(key, TemplateKey::PasswordReset);
    }
}
