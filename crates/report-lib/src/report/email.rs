//! SMTP delivery of the rendered report

use super::{render_html, render_text, ReportSink};
use crate::job::UtilizationReport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::collections::BTreeSet;
use tracing::info;

/// Connection and envelope settings for the SMTP sink
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub sender: String,
    pub subject: String,
}

/// Build the multipart (plain text + HTML) message for a report
pub fn compose_message(
    sender: &Mailbox,
    subject: &str,
    report: &UtilizationReport,
    recipients: &BTreeSet<String>,
) -> Result<Message> {
    if recipients.is_empty() {
        anyhow::bail!("Report has no recipients");
    }

    let mut builder = Message::builder().from(sender.clone()).subject(format!(
        "{} - week ending {}",
        subject,
        report.window.end.format("%Y-%m-%d")
    ));
    for recipient in recipients {
        let mailbox: Mailbox = recipient
            .parse()
            .with_context(|| format!("Invalid recipient address {}", recipient))?;
        builder = builder.to(mailbox);
    }

    builder
        .multipart(MultiPart::alternative_plain_html(
            render_text(report),
            render_html(report),
        ))
        .context("Failed to build report email")
}

/// Sends the report through an authenticated STARTTLS relay
pub struct SmtpReportSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    subject: String,
}

impl SmtpReportSink {
    pub fn new(settings: SmtpSettings) -> Result<Self> {
        let sender: Mailbox = settings
            .sender
            .parse()
            .with_context(|| format!("Invalid sender address {}", settings.sender))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .with_context(|| format!("Failed to configure SMTP relay {}", settings.host))?
            .port(settings.port)
            .credentials(Credentials::new(settings.username, settings.password))
            .build();

        Ok(Self {
            transport,
            sender,
            subject: settings.subject,
        })
    }
}

#[async_trait]
impl ReportSink for SmtpReportSink {
    async fn deliver(&self, report: &UtilizationReport, recipients: &BTreeSet<String>) -> Result<()> {
        let message = compose_message(&self.sender, &self.subject, report, recipients)?;

        let response = self
            .transport
            .send(message)
            .await
            .context("Failed to send report email")?;

        info!(
            recipients = recipients.len(),
            code = %response.code(),
            "Report email accepted by relay"
        );
        Ok(())
    }
}
