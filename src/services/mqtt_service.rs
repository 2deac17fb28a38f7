/// MQTT request/response service
///
/// Subscribes to `{base}/ghi`, runs every request through the irradiance
/// pipeline and publishes the result on `{base}/irad`. Failed requests are
/// answered on `{base}/error`.
///
/// Presence is announced on `{base}/status`: `online` after every connect,
/// `offline` as last will and on shutdown. Both are retained.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, Publish, QoS};

use crate::config::MqttConfig;
use crate::models::message::{ErrorRecord, OutputRecord};
use crate::services::pipeline::IrradiancePipeline;

const STATUS_ONLINE: &str = "online";
const STATUS_OFFLINE: &str = "offline";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Answer to one GHI request.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Irradiance(OutputRecord),
    Failure(ErrorRecord),
}

impl Response {
    pub fn topic<'a>(&self, irad_topic: &'a str, error_topic: &'a str) -> &'a str {
        match self {
            Response::Irradiance(_) => irad_topic,
            Response::Failure(_)    => error_topic,
        }
    }

    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            Response::Irradiance(record) => serde_json::to_vec(record),
            Response::Failure(record)    => serde_json::to_vec(record),
        }
    }
}

/// Runs one raw request through the pipeline.
pub fn respond(pipeline: &IrradiancePipeline, payload: &[u8]) -> Response {
    match pipeline.process_payload(payload) {
        Ok(result) => Response::Irradiance(OutputRecord::from(&result)),
        Err(e) => {
            warn!("[MQTT] Request rejected at {} stage: {}", e.stage(), e);
            Response::Failure(ErrorRecord::from(&e))
        }
    }
}

pub fn client_id(cfg: &MqttConfig) -> String {
    if cfg.client_id.is_empty() {
        format!("pv_model-{}", uuid::Uuid::new_v4())
    } else {
        cfg.client_id.clone()
    }
}

pub fn mqtt_options(cfg: &MqttConfig) -> MqttOptions {
    let mut opts = MqttOptions::new(client_id(cfg), &cfg.broker_host, cfg.broker_port);
    opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_s.max(5)));
    opts.set_clean_session(true);
    opts.set_max_packet_size(cfg.max_packet_size, cfg.max_packet_size);
    opts.set_last_will(LastWill::new(
        cfg.status_topic(),
        STATUS_OFFLINE,
        QoS::ExactlyOnce,
        true,
    ));

    if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
        opts.set_credentials(user, pass);
    }
    opts
}

/// Serves requests until Ctrl-C. Connection errors are retried forever.
pub async fn run_service(cfg: MqttConfig, pipeline: Arc<IrradiancePipeline>) {
    let opts = mqtt_options(&cfg);
    info!(
        "[MQTT] Connecting to {}:{} (client_id={}, base_topic={})",
        cfg.broker_host,
        cfg.broker_port,
        opts.client_id(),
        cfg.base_topic
    );

    let (client, mut eventloop) = AsyncClient::new(opts, 64);

    tokio::select! {
        _ = serve(&cfg, &client, &mut eventloop, pipeline) => {}
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("[MQTT] Unable to listen for shutdown signal: {}", e);
            }
            info!("[MQTT] Shutting down");
        }
    }

    shutdown(&cfg, &client, &mut eventloop).await;
}

async fn serve(
    cfg: &MqttConfig,
    client: &AsyncClient,
    eventloop: &mut EventLoop,
    pipeline: Arc<IrradiancePipeline>,
) {
    let ghi_topic = cfg.ghi_topic();
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                on_connect(cfg, client);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == ghi_topic => {
                tokio::spawn(handle_request(
                    client.clone(),
                    publish,
                    pipeline.clone(),
                    cfg.irad_topic(),
                    cfg.error_topic(),
                ));
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!("[MQTT] Ignoring message on {}", publish.topic);
            }
            Ok(_) => {}
            Err(e) => {
                error!("[MQTT] Event loop error: {} — will reconnect", e);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Runs inside the event-loop task, so it must never wait on the request
/// channel.
fn on_connect(cfg: &MqttConfig, client: &AsyncClient) {
    let status_topic = cfg.status_topic();
    if let Err(e) = client.try_publish(&status_topic, QoS::ExactlyOnce, true, STATUS_ONLINE) {
        error!("[MQTT] Failed to publish status to {}: {}", status_topic, e);
    }
    let ghi_topic = cfg.ghi_topic();
    match client.try_subscribe(&ghi_topic, QoS::ExactlyOnce) {
        Ok(())  => info!("[MQTT] Connected, listening on {}", ghi_topic),
        Err(e)  => error!("[MQTT] Failed to subscribe to {}: {}", ghi_topic, e),
    }
}

async fn handle_request(
    client: AsyncClient,
    publish: Publish,
    pipeline: Arc<IrradiancePipeline>,
    irad_topic: String,
    error_topic: String,
) {
    debug!("[MQTT] Request on {} ({} bytes)", publish.topic, publish.payload.len());

    // CPU-bound; keep it off the event loop
    let response = match tokio::task::spawn_blocking(move || respond(&pipeline, &publish.payload)).await {
        Ok(response) => response,
        Err(e) => {
            error!("[MQTT] Pipeline task failed: {}", e);
            return;
        }
    };

    let topic = response.topic(&irad_topic, &error_topic);
    let payload = match response.to_payload() {
        Ok(p) => p,
        Err(e) => {
            error!("[MQTT] Unable to encode response: {}", e);
            return;
        }
    };
    match client.publish(topic, QoS::ExactlyOnce, false, payload).await {
        Ok(())  => debug!("[MQTT] Response published to {}", topic),
        Err(e)  => error!("[MQTT] Publish error for {}: {}", topic, e),
    }
}

/// Nothing polls the event loop until the drain below, so requests are
/// queued without waiting.
async fn shutdown(cfg: &MqttConfig, client: &AsyncClient, eventloop: &mut EventLoop) {
    if let Err(e) = client.try_publish(cfg.status_topic(), QoS::ExactlyOnce, true, STATUS_OFFLINE) {
        warn!("[MQTT] Failed to publish offline status: {}", e);
    }
    if let Err(e) = client.try_disconnect() {
        warn!("[MQTT] Failed to request disconnect: {}", e);
    }

    // Flush the offline status and the disconnect
    let drain = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };
    if tokio::time::timeout(Duration::from_secs(2), drain).await.is_err() {
        warn!("[MQTT] Broker did not acknowledge shutdown in time");
    }
}
