use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use lettre::message::{header::ContentType, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use regex::Regex;
use tracing::{debug, info};

use crate::config::MailConfig;

pub mod templates;

pub use templates::{ContentKind, TemplateKey};

/// A hung mail provider must not stall the calling operation.
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("either text or html must be provided")]
    MissingBody,
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build email: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("smtp transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("mail send timed out")]
    Timeout,
}

/// Outbound notification contract. Sends a rendered message to an address;
/// fails if neither body variant is given.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: Option<&str>,
        html: Option<&str>,
    ) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .port(config.port)
            .build();

        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_address)
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid EMAIL_FROM: {e}"))?;

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: Option<&str>,
        html: Option<&str>,
    ) -> Result<(), MailError> {
        let builder = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(subject);

        let email = match (text, html) {
            (_, Some(html)) => {
                // Plain-text fallback for clients that don't render HTML.
                let plain = text
                    .map(str::to_string)
                    .unwrap_or_else(|| strip_html(html));
                builder.multipart(MultiPart::alternative_plain_html(
                    plain,
                    html.to_string(),
                ))?
            }
            (Some(text), None) => builder
                .header(ContentType::TEXT_PLAIN)
                .body(text.to_string())?,
            (None, None) => return Err(MailError::MissingBody),
        };

        match tokio::time::timeout(SEND_TIMEOUT, self.transport.send(email)).await {
            Ok(Ok(_)) => {
                info!(to, subject, "email sent");
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(MailError::Timeout),
        }
    }
}

/// Parameters for a templated notification.
pub struct TemplatedMail<'a> {
    pub to: &'a str,
    pub subject: Option<&'a str>,
    pub template_key: Option<TemplateKey>,
    pub template_text: Option<&'a str>,
    pub variables: HashMap<&'a str, String>,
}

/// Resolves a template (explicit text > named key > temp-password default),
/// renders it and routes by detected content kind.
pub async fn send_templated(mailer: &dyn Mailer, mail: TemplatedMail<'_>) -> Result<(), MailError> {
    let chosen = mail
        .template_text
        .unwrap_or_else(|| {
            mail.template_key
                .unwrap_or(TemplateKey::WelcomeTempPassword)
                .text()
        });

    let rendered = templates::render(chosen, &mail.variables);
    let subject = mail.subject.unwrap_or("Your temporary password");

    match ContentKind::detect(&rendered) {
        ContentKind::Html => {
            debug!(to = mail.to, "sending templated mail as html");
            mailer.send(mail.to, subject, None, Some(&rendered)).await
        }
        ContentKind::Text => mailer.send(mail.to, subject, Some(&rendered), None).await,
    }
}

/// Tag-stripping fallback used when an HTML mail carries no explicit text.
pub fn strip_html(html: &str) -> String {
    lazy_static! {
        static ref STYLE_RE: Regex = Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap();
        static ref SCRIPT_RE: Regex = Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap();
        static ref TAG_RE: Regex = Regex::new(r"<[^>]+>").unwrap();
        static ref SPACE_RE: Regex = Regex::new(r"\s+").unwrap();
    }
    let no_style = STYLE_RE.replace_all(html, "");
    let no_script = SCRIPT_RE.replace_all(&no_style, "");
    let no_tags = TAG_RE.replace_all(&no_script, "");
    SPACE_RE.replace_all(&no_tags, " ").trim().to_string()
}


#[cfg(test)]
mod tests {
    use super::mock::MockMailer;
    use super::*;

    fn vars(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[tokio::test]
    async fn templated_plain_text_routes_as_text() {
        let mailer = MockMailer::default();
        send_templated(
            &mailer,
            TemplatedMail {
                to: "user@example.com",
                subject: None,
                template_key: None,
                template_text: None,
                variables: vars(&[("nameOrEmail", "user@example.com"), ("tempPassword", "Xy3!abcd")]),
            },
        )
        .await
        .expect("send ok");

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Your temporary password");
        let text = sent[0].text.as_deref().expect("text body");
        assert!(text.contains("Xy3!abcd"));
        assert!(sent[0].html.is_none());
    }

    #[tokio::test]
    async fn templated_html_routes_as_html() {
        let mailer = MockMailer::default();
        send_templated(
            &mailer,
            TemplatedMail {
                to: "user@example.com",
                subject: Some("Hello"),
                template_key: None,
                template_text: Some("<html><body>Hi {{nameOrEmail}}</body></html>"),
                variables: vars(&[("nameOrEmail", "Dana")]),
            },
        )
        .await
        .expect("send ok");

        let sent = mailer.sent.lock().unwrap();
        let html = sent[0].html.as_deref().expect("html body");
        assert!(html.contains("Hi Dana"));
        assert!(sent[0].text.is_none());
    }

    #[tokio::test]
    async fn explicit_template_text_wins_over_key() {
        let mailer = MockMailer::default();
        send_templated(
            &mailer,
            TemplatedMail {
                to: "user@example.com",
                subject: Some("Reset"),
                template_key: Some(TemplateKey::PasswordReset),
                template_text: Some("custom {{resetToken}}"),
                variables: vars(&[("resetToken", "tok-123")]),
            },
        )
        .await
        .expect("send ok");

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent[0].text.as_deref(), Some("custom tok-123"));
    }

    #[test]
    fn strip_html_drops_tags_styles_and_scripts() {
        let html = "<html><style>p { color: red; }</style>\
                    <script>alert(1)</script><body><p>Hello   world</p></body></html>";
        assert_eq!(strip_html(html), "Hello world");
    }
}
