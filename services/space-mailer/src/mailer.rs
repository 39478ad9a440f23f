//! Email delivery
//!
//! `Mailer` is the seam between the webhook dispatcher and outbound mail.
//! `SmtpMailer` composes a multipart/related HTML email (inline brand image
//! when configured) and submits it over STARTTLS with credentials.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use askama::Template;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::debug;
use webex_api::Message;

use crate::config::SmtpConfig;

/// Content id of the inline brand image.
const BRAND_CID: &str = "brand-logo";

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors delivering one email to one recipient.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("invalid address {address:?}: {message}")]
    Address { address: String, message: String },

    #[error("rendering email body failed: {0}")]
    Render(#[from] askama::Error),

    #[error("building email failed: {0}")]
    Build(String),

    #[error("SMTP submission failed: {0}")]
    Transport(String),

    #[error("reading brand image failed: {0}")]
    BrandImage(#[from] std::io::Error),
}

/// Delivers one Webex message to one recipient.
pub trait Mailer: Send + Sync {
    fn deliver<'a>(
        &'a self,
        room_title: &'a str,
        recipient: &'a str,
        message: &'a Message,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send + 'a>>;
}

#[derive(Template)]
#[template(path = "email.html")]
struct EmailBody<'a> {
    room_title: &'a str,
    sender: &'a str,
    sent_at: String,
    /// `content` is provider-rendered HTML and is embedded unescaped
    rich: bool,
    content: &'a str,
    brand_cid: Option<&'a str>,
}

/// Subject line for a forwarded message.
pub fn subject(room_title: &str) -> String {
    format!("{room_title} - Webex Space Message")
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address.parse().map_err(|e: lettre::address::AddressError| DeliveryError::Address {
        address: address.to_owned(),
        message: e.to_string(),
    })
}

/// Build the full email for one recipient.
pub fn compose(
    from: &Mailbox,
    room_title: &str,
    recipient: &str,
    message: &Message,
    brand_image: Option<&[u8]>,
) -> Result<lettre::Message, DeliveryError> {
    let html = EmailBody {
        room_title,
        sender: &message.person_email,
        sent_at: message.created.format("%Y-%m-%d - %H:%M:%S").to_string(),
        rich: message.html.is_some(),
        content: message.content(),
        brand_cid: brand_image.map(|_| BRAND_CID),
    }
    .render()?;

    let builder = lettre::Message::builder()
        .from(from.clone())
        .to(parse_mailbox(recipient)?)
        .subject(subject(room_title));

    let email = match brand_image {
        Some(image) => {
            let png = ContentType::parse("image/png")
                .map_err(|e| DeliveryError::Build(e.to_string()))?;
            builder.multipart(
                MultiPart::related()
                    .singlepart(SinglePart::html(html))
                    .singlepart(Attachment::new_inline(BRAND_CID.to_owned()).body(image.to_vec(), png)),
            )
        }
        None => builder.singlepart(SinglePart::html(html)),
    };
    email.map_err(|e| DeliveryError::Build(e.to_string()))
}

/// SMTP submission through a STARTTLS relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    brand_image: Option<Vec<u8>>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, DeliveryError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.expose().clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        let brand_image = config
            .brand_image
            .as_deref()
            .map(std::fs::read)
            .transpose()?;

        Ok(Self {
            transport,
            from: parse_mailbox(config.sender())?,
            brand_image,
        })
    }
}

impl Mailer for SmtpMailer {
    fn deliver<'a>(
        &'a self,
        room_title: &'a str,
        recipient: &'a str,
        message: &'a Message,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send + 'a>> {
        Box::pin(async move {
            let email = compose(
                &self.from,
                room_title,
                recipient,
                message,
                self.brand_image.as_deref(),
            )?;
            let response = self
                .transport
                .send(email)
                .await
                .map_err(|e| DeliveryError::Transport(e.to_string()))?;
            debug!(recipient, code = %response.code(), "SMTP relay accepted message");
            Ok(())
        })
    }
}
