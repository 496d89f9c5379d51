//! Admin push notifications through a OneSignal-compatible HTTP API.

use crate::clock::shop_tz;
use crate::config::PushConfig;
use crate::models::Appointment;

/// Request body: broadcast to every subscribed admin device.
fn push_body(config: &PushConfig, heading: &str, message: &str) -> serde_json::Value {
    serde_json::json!({
        "app_id": config.app_id,
        "included_segments": ["Subscribed Users"],
        "headings": { "en": heading, "pt": heading },
        "contents": { "en": message, "pt": message },
    })
}

/// Text of the "new appointment" notification.
pub fn appointment_message(appointment: &Appointment) -> String {
    let when = appointment
        .scheduled_at
        .with_timezone(&shop_tz())
        .format("%d/%m às %H:%M");
    format!(
        "{} agendou para {} · R$ {:.2} ({} itens)",
        appointment.customer_name,
        when,
        appointment.total,
        appointment.items.len()
    )
}

pub async fn push_admin(
    http: &reqwest::Client,
    config: &PushConfig,
    heading: &str,
    message: &str,
) -> anyhow::Result<()> {
    let resp = http
        .post(&config.api_url)
        .header("Authorization", format!("Key {}", config.api_key))
        .json(&push_body(config, heading, message))
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!("push API error: {} - {}", status, text);
    }
    Ok(())
}

/// Fire-and-forget [`push_admin`]; failures are logged only.
pub fn spawn_push(http: reqwest::Client, config: PushConfig, heading: String, message: String) {
    if !config.enabled() {
        tracing::debug!("push disabled, skipping notification");
        return;
    }
    tokio::spawn(async move {
        if let Err(e) = push_admin(&http, &config, &heading, &message).await {
            tracing::warn!(error = %e, "admin push notification failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentStatus, ItemKind, LineItem, PaymentMethod};
    use chrono::{DateTime, Utc};
    use sqlx::types::Json;

    #[test]
    fn test_push_body_targets_app() {
        let config = PushConfig {
            api_url: "http://push.local".into(),
            app_id: "app-1".into(),
            api_key: "k".into(),
        };
        let body = push_body(&config, "Novo agendamento", "Ana às 14:00");
        assert_eq!(body["app_id"], "app-1");
        assert_eq!(body["contents"]["pt"], "Ana às 14:00");
    }

    #[test]
    fn test_appointment_message_uses_shop_time() {
        let scheduled_at = DateTime::parse_from_rfc3339("2024-06-10T14:00:00-03:00")
            .unwrap()
            .with_timezone(&Utc);
        let appointment = Appointment {
            id: 7,
            items: Json(vec![LineItem {
                kind: ItemKind::Service,
                id: 1,
                name: "Henna".into(),
                price: 35.0,
                quantity: 1,
            }]),
            customer_name: "Ana".into(),
            customer_phone: "11988887777".into(),
            payment_method: PaymentMethod::Pix,
            scheduled_at,
            status: AppointmentStatus::Pending,
            subtotal: 35.0,
            coupon_code: None,
            coupon_discount: 0.0,
            payment_discount: 0.0,
            total: 35.0,
            estimated_time: None,
            created_at: scheduled_at,
            confirmed_at: None,
        };
        assert_eq!(
            appointment_message(&appointment),
            "Ana agendou para 10/06 às 14:00 · R$ 35.00 (1 itens)"
        );
    }
}
