//! # Temporary Contacts Module
//!
//! Disposable mailboxes (1secmail) and phone numbers (5sim) handed out from
//! the main menu.

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::{ensure_success, ServiceError};
use crate::session::{Mailbox, PhoneOrder};

pub const MAILBOX_DOMAINS: [&str; 3] = ["1secmail.com", "1secmail.org", "1secmail.net"];
const LOGIN_LENGTH: usize = 10;
const LOGIN_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// One line of a mailbox listing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MailSummary {
    pub id: u64,
    pub from: String,
    pub subject: String,
    pub date: String,
}

/// A full message
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MailMessage {
    pub id: u64,
    pub from: String,
    pub subject: String,
    pub date: String,
    #[serde(rename = "textBody", default)]
    pub text_body: String,
    #[serde(default)]
    pub body: String,
}

impl MailMessage {
    /// Plain text when the sender provided it, the raw body otherwise
    pub fn readable_body(&self) -> &str {
        if self.text_body.trim().is_empty() {
            &self.body
        } else {
            &self.text_body
        }
    }
}

/// Provider of disposable mailboxes and phone numbers
#[async_trait]
pub trait ContactProvider: Send + Sync {
    async fn create_mailbox(&self) -> Result<Mailbox, ServiceError>;
    async fn list_messages(&self, mailbox: &Mailbox) -> Result<Vec<MailSummary>, ServiceError>;
    async fn read_message(&self, mailbox: &Mailbox, id: u64) -> Result<MailMessage, ServiceError>;
    async fn order_number(&self) -> Result<PhoneOrder, ServiceError>;
    /// First received code, `None` while nothing has arrived
    async fn check_sms(&self, order: &PhoneOrder) -> Result<Option<String>, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: u64,
    phone: String,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    #[serde(default)]
    sms: Option<Vec<SmsEntry>>,
}

#[derive(Debug, Deserialize)]
struct SmsEntry {
    #[serde(default)]
    code: String,
    #[serde(default)]
    text: String,
}

/// 1secmail mailboxes and 5sim numbers over HTTP
#[derive(Debug, Clone)]
pub struct TempContactService {
    client: reqwest::Client,
    mailbox_endpoint: String,
    phone_endpoint: String,
    phone_api_key: Option<String>,
}

impl TempContactService {
    pub fn new(
        client: reqwest::Client,
        mailbox_endpoint: &str,
        phone_endpoint: &str,
        phone_api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            mailbox_endpoint: mailbox_endpoint.to_string(),
            phone_endpoint: phone_endpoint.trim_end_matches('/').to_string(),
            phone_api_key,
        }
    }

    fn phone_key(&self) -> Result<&str, ServiceError> {
        self.phone_api_key
            .as_deref()
            .ok_or_else(|| ServiceError::NotConfigured("TEMP_NUMBER_API_KEY".to_string()))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ServiceError> {
        let response = ensure_success(request.send().await?).await?;
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| ServiceError::InvalidResponse(format!("unexpected body: {e}")))
    }
}

/// Random mailbox login of lowercase letters and digits
pub fn generate_login<R: Rng>(rng: &mut R) -> String {
    (0..LOGIN_LENGTH)
        .map(|_| LOGIN_CHARSET[rng.gen_range(0..LOGIN_CHARSET.len())] as char)
        .collect()
}

fn first_code(check: CheckResponse) -> Option<String> {
    check.sms.unwrap_or_default().into_iter().find_map(|sms| {
        let code = sms.code.trim();
        if !code.is_empty() {
            Some(code.to_string())
        } else if !sms.text.trim().is_empty() {
            Some(sms.text.trim().to_string())
        } else {
            None
        }
    })
}

#[async_trait]
impl ContactProvider for TempContactService {
    async fn create_mailbox(&self) -> Result<Mailbox, ServiceError> {
        let mut rng = rand::thread_rng();
        let mailbox = Mailbox {
            login: generate_login(&mut rng),
            domain: MAILBOX_DOMAINS[rng.gen_range(0..MAILBOX_DOMAINS.len())].to_string(),
        };
        info!(address = %mailbox.address(), "Created temporary mailbox");
        Ok(mailbox)
    }

    async fn list_messages(&self, mailbox: &Mailbox) -> Result<Vec<MailSummary>, ServiceError> {
        let request = self.client.get(&self.mailbox_endpoint).query(&[
            ("action", "getMessages"),
            ("login", mailbox.login.as_str()),
            ("domain", mailbox.domain.as_str()),
        ]);
        let messages: Vec<MailSummary> = self.get_json(request).await?;
        debug!(address = %mailbox.address(), count = messages.len(), "Fetched inbox");
        Ok(messages)
    }

    async fn read_message(&self, mailbox: &Mailbox, id: u64) -> Result<MailMessage, ServiceError> {
        let id = id.to_string();
        let request = self.client.get(&self.mailbox_endpoint).query(&[
            ("action", "readMessage"),
            ("login", mailbox.login.as_str()),
            ("domain", mailbox.domain.as_str()),
            ("id", id.as_str()),
        ]);
        self.get_json(request).await
    }

    async fn order_number(&self) -> Result<PhoneOrder, ServiceError> {
        let key = self.phone_key()?;
        let url = format!("{}/user/buy/activation/any/any/telegram", self.phone_endpoint);
        let order: OrderResponse = self
            .get_json(self.client.get(url).bearer_auth(key))
            .await?;
        info!(order_id = order.id, "Ordered temporary number");
        Ok(PhoneOrder {
            order_id: order.id,
            phone: order.phone,
        })
    }

    async fn check_sms(&self, order: &PhoneOrder) -> Result<Option<String>, ServiceError> {
        let key = self.phone_key()?;
        let url = format!("{}/user/check/{}", self.phone_endpoint, order.order_id);
        let check: CheckResponse = self
            .get_json(self.client.get(url).bearer_auth(key))
            .await?;
        Ok(first_code(check))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generate_login() {
        let mut rng = StdRng::seed_from_u64(7);
        let login = generate_login(&mut rng);
        assert_eq!(login.len(), LOGIN_LENGTH);
        assert!(login
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(login, generate_login(&mut rng));
    }

    #[test]
    fn test_parse_mail_message() {
        let body = r#"{"id":639,"from":"someone@example.com","subject":"Hi","date":"2018-06-08 14:33:55","attachments":[],"body":"<b>Hello</b>","textBody":"Hello","htmlBody":"<b>Hello</b>"}"#;
        let message: MailMessage = serde_json::from_str(body).unwrap();
        assert_eq!(message.id, 639);
        assert_eq!(message.readable_body(), "Hello");

        let html_only = r#"{"id":1,"from":"a","subject":"b","date":"c","body":"<p>x</p>"}"#;
        let message: MailMessage = serde_json::from_str(html_only).unwrap();
        assert_eq!(message.readable_body(), "<p>x</p>");
    }

    #[test]
    fn test_first_code() {
        let check: CheckResponse =
            serde_json::from_str(r#"{"id":1,"sms":[{"code":"","text":""},{"code":"12345","text":"Telegram code 12345"}]}"#)
                .unwrap();
        assert_eq!(first_code(check), Some("12345".to_string()));

        let empty: CheckResponse = serde_json::from_str(r#"{"id":1,"sms":null}"#).unwrap();
        assert_eq!(first_code(empty), None);
        let missing: CheckResponse = serde_json::from_str(r#"{"id":1}"#).unwrap();
        assert_eq!(first_code(missing), None);
    }

    #[tokio::test]
    async fn test_phone_requires_key() {
        let service = TempContactService::new(
            reqwest::Client::new(),
            crate::config::MAILBOX_API_ENDPOINT,
            crate::config::PHONE_API_ENDPOINT,
            None,
        );
        let order = PhoneOrder {
            order_id: 1,
            phone: "+100".to_string(),
        };
        assert!(matches!(
            service.order_number().await,
            Err(ServiceError::NotConfigured(_))
        ));
        assert!(matches!(
            service.check_sms(&order).await,
            Err(ServiceError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_create_mailbox_uses_known_domain() {
        let service = TempContactService::new(
            reqwest::Client::new(),
            crate::config::MAILBOX_API_ENDPOINT,
            crate::config::PHONE_API_ENDPOINT,
            None,
        );
        let mailbox = service.create_mailbox().await.unwrap();
        assert!(MAILBOX_DOMAINS.contains(&mailbox.domain.as_str()));
        assert!(mailbox.address().ends_with(&mailbox.domain));
    }
}
