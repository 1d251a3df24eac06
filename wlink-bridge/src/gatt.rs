//! BlueZ binding: GATT application, advertising and link tracking
//!
//! Everything protocol-related lives in [`Peripheral`]; this module only
//! translates between BlueZ and it.
//!
//! BlueZ does not say which device subscribed to a notify characteristic, so
//! notifications go to every subscribed client. With the usual single phone
//! per host this is the client that wrote the command.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bluer::adv::Advertisement;
use bluer::gatt::local::{
    Application, Characteristic, CharacteristicNotifier, CharacteristicNotify,
    CharacteristicNotifyMethod, CharacteristicWrite, CharacteristicWriteMethod,
    CharacteristicWriteRequest, ReqError, Service,
};
use bluer::{Adapter, Address};
use log::{debug, info, warn};
use tokio::sync::{Mutex, mpsc, oneshot};
use wlink_net::NetworkOps;
use wlink_proto::{OutputChunk, gatt};

use crate::config::BridgeConfig;
use crate::dispatcher::Dispatcher;
use crate::error::BridgeError;
use crate::peripheral::{
    LinkSecurity, NotifyError, NotifySink, PeerId, Peripheral, WriteEvent, WriteRejected,
};

type PendingNotify = (Vec<u8>, oneshot::Sender<Result<(), NotifyError>>);

/// Longest wait for BlueZ to take one notification
const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// [`NotifySink`] feeding the notification pump; each send waits for BlueZ
/// to take the value.
pub struct BluezNotifier {
    tx: mpsc::Sender<PendingNotify>,
    subscribed: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl NotifySink for BluezNotifier {
    async fn send(&self, _peer: &PeerId, chunk: OutputChunk) -> Result<(), NotifyError> {
        if !self.subscribed.load(Ordering::Acquire) {
            return Err(NotifyError::NotSubscribed);
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send((chunk.bytes, ack_tx))
            .await
            .map_err(|_| NotifyError::Failed("notification pump stopped".to_string()))?;
        match tokio::time::timeout(ACK_TIMEOUT, ack_rx).await {
            Ok(ack) => ack.map_err(|_| NotifyError::Disconnected)?,
            Err(_) => Err(NotifyError::Failed("notification not acknowledged".to_string())),
        }
    }
}

/// Drains queued chunks into the subscribed client's notifier
struct NotifyPump {
    rx: Mutex<mpsc::Receiver<PendingNotify>>,
    subscribed: Arc<AtomicBool>,
}

fn notify_channel() -> (BluezNotifier, NotifyPump) {
    let (tx, rx) = mpsc::channel(16);
    let subscribed = Arc::new(AtomicBool::new(false));
    (
        BluezNotifier {
            tx,
            subscribed: subscribed.clone(),
        },
        NotifyPump {
            rx: Mutex::new(rx),
            subscribed,
        },
    )
}

impl NotifyPump {
    async fn run(&self, mut notifier: CharacteristicNotifier) {
        let mut rx = self.rx.lock().await;
        self.subscribed.store(true, Ordering::Release);
        info!("client subscribed to output");

        loop {
            let next = tokio::select! {
                _ = notifier.stopped() => None,
                pending = rx.recv() => pending,
            };
            let Some((data, ack)) = next else {
                break;
            };

            debug!("notify {} bytes", data.len());
            let result = notifier
                .notify(data)
                .await
                .map_err(|e| NotifyError::Failed(e.to_string()));
            let failed = result.is_err();
            let _ = ack.send(result);
            if failed {
                warn!("notification failed, dropping subscription");
                break;
            }
        }

        self.subscribed.store(false, Ordering::Release);
        abandon_pending(&mut rx);
        info!("client unsubscribed from output");
    }
}

/// Fail chunks queued for a subscriber that is gone. The receiver stays open
/// for the next subscription.
fn abandon_pending(rx: &mut mpsc::Receiver<PendingNotify>) {
    let mut dropped = 0;
    while let Ok((_, ack)) = rx.try_recv() {
        let _ = ack.send(Err(NotifyError::NotSubscribed));
        dropped += 1;
    }
    if dropped > 0 {
        debug!("dropped {dropped} queued notifications");
    }
}

/// Paired means the link was encrypted with the bonded keys
async fn link_security(adapter: &Adapter, addr: Address) -> LinkSecurity {
    let paired = match adapter.device(addr) {
        Ok(device) => device.is_paired().await.unwrap_or(false),
        Err(_) => false,
    };
    if paired {
        LinkSecurity::Encrypted
    } else {
        LinkSecurity::Unencrypted
    }
}

async fn on_command_write(
    adapter: Adapter,
    peripheral: Arc<Peripheral>,
    data: Vec<u8>,
    req: CharacteristicWriteRequest,
) -> Result<(), ReqError> {
    debug!(
        "write from {}: {} bytes, mtu {}, offset {}",
        req.device_address,
        data.len(),
        req.mtu,
        req.offset
    );

    let event = WriteEvent {
        peer: PeerId::new(req.device_address.to_string()),
        mtu: req.mtu,
        offset: req.offset,
        security: link_security(&adapter, req.device_address).await,
        data,
    };

    match peripheral.on_write(event) {
        Ok(_) => Ok(()),
        Err(WriteRejected::EncryptionRequired) => Err(ReqError::NotAuthorized),
    }
}

fn application(adapter: Adapter, peripheral: Arc<Peripheral>, pump: Arc<NotifyPump>) -> Application {
    let command = Characteristic {
        uuid: gatt::COMMAND_UUID,
        write: Some(CharacteristicWrite {
            write: true,
            write_without_response: true,
            encrypt_authenticated_write: true,
            method: CharacteristicWriteMethod::Fun(Box::new(
                move |data: Vec<u8>, req: CharacteristicWriteRequest| {
                    let adapter = adapter.clone();
                    let peripheral = peripheral.clone();
                    Box::pin(on_command_write(adapter, peripheral, data, req))
                },
            )),
            ..Default::default()
        }),
        ..Default::default()
    };

    let output = Characteristic {
        uuid: gatt::OUTPUT_UUID,
        notify: Some(CharacteristicNotify {
            notify: true,
            method: CharacteristicNotifyMethod::Fun(Box::new(move |notifier| {
                let pump = pump.clone();
                Box::pin(async move { pump.run(notifier).await })
            })),
            ..Default::default()
        }),
        ..Default::default()
    };

    Application {
        services: vec![Service {
            uuid: gatt::SERVICE_UUID,
            primary: true,
            characteristics: vec![command, output],
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Polls BlueZ for peers that dropped their link
async fn watch_disconnects(adapter: Adapter, peripheral: Arc<Peripheral>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        for peer in peripheral.peers() {
            let connected = match peer.as_str().parse::<Address>() {
                Ok(addr) => match adapter.device(addr) {
                    Ok(device) => device.is_connected().await.unwrap_or(false),
                    Err(_) => false,
                },
                Err(_) => false,
            };
            if !connected {
                peripheral.on_disconnect(&peer);
            }
        }
    }
}

async fn open_adapter(session: &bluer::Session, name: Option<&str>) -> Result<Adapter, BridgeError> {
    let Some(name) = name else {
        return Ok(session.default_adapter().await?);
    };
    if !session.adapter_names().await?.iter().any(|n| n == name) {
        return Err(BridgeError::NoAdapter(name.to_string()));
    }
    Ok(session.adapter(name)?)
}

/// Serve the command channel until Ctrl-C
pub async fn serve(config: &BridgeConfig, network: Arc<dyn NetworkOps>) -> Result<(), BridgeError> {
    let session = bluer::Session::new().await?;
    let adapter = open_adapter(&session, config.adapter.as_deref()).await?;
    if !adapter.is_powered().await? {
        info!("powering on {}", adapter.name());
        adapter.set_powered(true).await?;
    }

    let name = config.device_name();
    adapter.set_alias(name.clone()).await?;

    let (notifier, pump) = notify_channel();
    let dispatcher = Arc::new(Dispatcher::new(network));
    let peripheral = Arc::new(Peripheral::new(
        dispatcher,
        Arc::new(notifier),
        config.peripheral_config(),
    ));

    let _app = adapter
        .serve_gatt_application(application(adapter.clone(), peripheral.clone(), Arc::new(pump)))
        .await?;

    let _adv = adapter
        .advertise(Advertisement {
            service_uuids: vec![gatt::SERVICE_UUID].into_iter().collect(),
            discoverable: Some(true),
            local_name: Some(name.clone()),
            ..Default::default()
        })
        .await?;

    info!(
        "advertising {name:?} on {} ({})",
        adapter.name(),
        adapter.address().await?
    );

    let watcher = tokio::spawn(watch_disconnects(
        adapter.clone(),
        peripheral.clone(),
        config.disconnect_poll(),
    ));

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    watcher.abort();
    Ok(())
}
