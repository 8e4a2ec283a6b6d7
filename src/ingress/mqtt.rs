use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS, Transport};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::{DISTANCE_TOPIC, MQTT_KEEP_ALIVE, MQTT_RECONNECT_BACKOFF, MqttConfig, POSITION_TOPIC};

use super::IngressAdapter;

const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// A running broker connection: the client plus the task polling its event loop
pub struct MqttConnection {
    client: AsyncClient,
    task: JoinHandle<()>,
}

impl MqttConnection {
    pub(super) fn close(self) {
        if let Err(e) = self.client.try_disconnect() {
            trace!("disconnect request not queued: {e}");
        }
        self.task.abort();
    }
}

pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(MQTT_KEEP_ALIVE);

    if let Some(username) = &config.username {
        options.set_credentials(username, config.password.as_deref().unwrap_or_default());
    }

    if config.tls {
        options.set_transport(Transport::tls_with_default_config());
    }

    options
}

pub(super) fn spawn_event_loop(
    adapter: Weak<IngressAdapter>,
    connected: Arc<AtomicBool>,
    config: &MqttConfig,
) -> MqttConnection {
    let (client, eventloop) = AsyncClient::new(mqtt_options(config), REQUEST_CHANNEL_CAPACITY);

    let task = tokio::spawn(run_event_loop(
        adapter,
        client.clone(),
        eventloop,
        connected,
        MQTT_RECONNECT_BACKOFF,
    ));

    MqttConnection { client, task }
}

/// Poll the broker until the adapter goes away.
///
/// rumqttc reconnects on the next poll after an error, so a failed poll only has to
/// mark the connection down and wait out the backoff.
async fn run_event_loop(
    adapter: Weak<IngressAdapter>,
    client: AsyncClient,
    mut eventloop: EventLoop,
    connected: Arc<AtomicBool>,
    backoff: Duration,
) {
    debug!("starting MQTT event loop");

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                connected.store(true, Ordering::Release);
                info!("connected to MQTT broker ({:?})", ack.code);

                // clean sessions drop subscriptions, so every connect re-issues both
                for topic in [POSITION_TOPIC, DISTANCE_TOPIC] {
                    if let Err(e) = client.try_subscribe(topic, QoS::AtMostOnce) {
                        warn!("failed to subscribe to {topic}: {e}");
                    }
                }
            }

            Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                debug!("subscription acknowledged: {:?}", ack.return_codes);
            }

            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                let Some(adapter) = adapter.upgrade() else {
                    break;
                };

                trace!("received on {}: {} bytes", publish.topic, publish.payload.len());
                if let Err(e) = adapter.handle_message(&publish.topic, &publish.payload) {
                    warn!("discarded message: {e}");
                }
            }

            Ok(Event::Incoming(Incoming::Disconnect)) => {
                connected.store(false, Ordering::Release);
                info!("broker closed the connection");
            }

            Ok(_) => {}

            Err(e) => {
                connected.store(false, Ordering::Release);
                warn!("MQTT connection error: {e}, reconnecting in {backoff:?}");
                tokio::time::sleep(backoff).await;
            }
        }

        if adapter.strong_count() == 0 {
            break;
        }
    }

    connected.store(false, Ordering::Release);
    debug!("MQTT event loop stopped");
}
