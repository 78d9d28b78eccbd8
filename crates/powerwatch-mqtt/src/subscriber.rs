//! Broker subscriber

use powerwatch_api::InboundMessage;
use powerwatch_config::MqttSettings;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::mqttbytes::v5::{Packet, SubscribeReasonCode};
use rumqttc::v5::{AsyncClient, Event, EventLoop, MqttOptions};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{TransportError, TransportResult};

/// Capacity of the request channel between client handle and event loop
const REQUEST_CAPACITY: usize = 10;

/// Pause before polling again after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Subscribes to one topic and forwards every publish to the mailbox
pub struct MqttSubscriber {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    server: String,
}

/// Handle for stopping the subscriber from another task
#[derive(Clone)]
pub struct MqttHandle {
    client: AsyncClient,
}

impl MqttHandle {
    /// Send a DISCONNECT to the broker. The session outlives it for the
    /// configured expiry interval.
    pub async fn disconnect(&self) -> TransportResult<()> {
        self.client.disconnect().await?;
        Ok(())
    }
}

impl MqttSubscriber {
    /// Create a new subscriber. Nothing is sent until [`run`](Self::run).
    pub fn new(settings: &MqttSettings, client_id: &str) -> Self {
        let options = mqtt_options(settings, client_id);
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        Self {
            client,
            eventloop,
            topic: settings.topic.clone(),
            server: settings.server(),
        }
    }

    pub fn handle(&self) -> MqttHandle {
        MqttHandle {
            client: self.client.clone(),
        }
    }

    /// Drive the connection until the broker disconnects us, refuses the
    /// subscription, or the mailbox closes. Connection errors are logged and
    /// retried.
    pub async fn run(mut self, mailbox: mpsc::Sender<InboundMessage>) -> TransportResult<()> {
        info!(server = %self.server, topic = %self.topic, "Connecting to broker");

        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!(
                        server = %self.server,
                        session_present = ack.session_present,
                        "Connected"
                    );
                    // Subscribing on every ConnAck keeps the subscription across reconnects.
                    self.client.try_subscribe(&self.topic, QoS::AtLeastOnce)?;
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    check_subscription(&self.topic, &ack.return_codes)?;
                    info!(topic = %self.topic, "Subscribed");
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = to_inbound(&publish.topic, &publish.payload, publish.retain);
                    debug!(
                        topic = %message.topic,
                        retained = message.retained,
                        bytes = message.payload.len(),
                        "Publish received"
                    );
                    if mailbox.send(message).await.is_err() {
                        info!("Mailbox closed; transport stopping");
                        return Ok(());
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect(disconnect))) => {
                    error!(server = %self.server, disconnect = ?disconnect, "Server requested disconnect");
                    return Err(TransportError::ServerDisconnect);
                }
                Ok(event) => {
                    debug!(event = ?event, "MQTT event");
                }
                Err(e) => {
                    warn!(server = %self.server, error = %e, "Error while attempting connection");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}

/// Connection options: MQTT 5, no clean start, session kept for the
/// configured expiry after a disconnect.
pub fn mqtt_options(settings: &MqttSettings, client_id: &str) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, settings.host.clone(), settings.port);
    options.set_keep_alive(settings.keep_alive);
    options.set_clean_start(false);
    options.set_session_expiry_interval(Some(settings.session_expiry_seconds));

    if let Some(username) = &settings.username {
        options.set_credentials(
            username.clone(),
            settings.password.clone().unwrap_or_default(),
        );
    }

    options
}

/// Fail unless the broker granted every requested subscription.
fn check_subscription(topic: &str, codes: &[SubscribeReasonCode]) -> TransportResult<()> {
    match codes
        .iter()
        .find(|code| !matches!(code, SubscribeReasonCode::Success(_)))
    {
        Some(code) => {
            error!(topic = %topic, code = ?code, "Broker rejected subscription");
            Err(TransportError::SubscriptionRejected {
                topic: topic.to_string(),
                reason: format!("{code:?}"),
            })
        }
        None => Ok(()),
    }
}

/// Copy a publish into the transport-neutral message type
fn to_inbound(topic: &[u8], payload: &[u8], retained: bool) -> InboundMessage {
    InboundMessage::new(String::from_utf8_lossy(topic), payload.to_vec()).retained(retained)
}

#[cfg(test)]
mod tests {
    use super::*;
    use powerwatch_config::{RawConfig, Settings};

    fn settings() -> MqttSettings {
        let mut raw = RawConfig::default();
        raw.mqtt.server = Some("mqtt.lan:1884".into());
        raw.mqtt.topic = Some("power/alarms".into());
        raw.mqtt.username = Some("ups".into());
        raw.mqtt.password = Some("secret".into());
        Settings::from_raw(raw).mqtt
    }

    #[test]
    fn options_use_persistent_session() {
        let options = mqtt_options(&settings(), "host/powerwatchd");
        assert_eq!(options.client_id(), "host/powerwatchd");
        assert_eq!(options.broker_address(), ("mqtt.lan".to_string(), 1884));
        assert!(!options.clean_start());
        assert_eq!(options.keep_alive(), Duration::from_secs(20));
        assert_eq!(options.session_expiry_interval(), Some(300));
    }

    #[test]
    fn session_expiry_follows_settings() {
        let mut s = settings();
        s.session_expiry_seconds = 3600;
        let options = mqtt_options(&s, "host/powerwatchd");
        assert_eq!(options.session_expiry_interval(), Some(3600));
    }

    #[test]
    fn granted_subscription_accepted() {
        let codes = [SubscribeReasonCode::Success(QoS::AtLeastOnce)];
        assert!(check_subscription("power/alarms", &codes).is_ok());
    }

    #[test]
    fn rejected_subscription_is_an_error() {
        let codes = [SubscribeReasonCode::NotAuthorized];
        let err = check_subscription("power/alarms", &codes).unwrap_err();
        assert!(matches!(
            err,
            TransportError::SubscriptionRejected { ref topic, .. } if topic == "power/alarms"
        ));
    }

    #[test]
    fn publish_converted_to_inbound() {
        let message = to_inbound(b"power/alarms", br#"{"up":false,"type":1}"#, true);
        assert_eq!(message.topic, "power/alarms");
        assert_eq!(message.payload, br#"{"up":false,"type":1}"#.to_vec());
        assert!(message.retained);
    }
}
