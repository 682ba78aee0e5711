//! BLE GATT peripheral on BlueZ.
//!
//! Exposes one primary service with two characteristics:
//!
//! - OTP (write, write-without-response): the payload goes straight to
//!   [`AccessController::submit_otp`]. A rejected payload answers a
//!   write-with-response with a GATT `Failed` error.
//! - Status (read, notify): reads return the current six byte frame, and
//!   every frame published on the controller's hub is pushed to each
//!   subscribed central.
//!
//! The advertisement carries the local device name and the service UUID.
//! Both registrations live as long as the returned [`GattServer`].

use bluer::adv::{Advertisement, AdvertisementHandle, Type as AdvertisementType};
use bluer::gatt::local::{
    Application, ApplicationHandle, Characteristic, CharacteristicNotifier, CharacteristicNotify,
    CharacteristicNotifyMethod, CharacteristicRead, CharacteristicWrite,
    CharacteristicWriteMethod, ReqError, Service,
};
use futures::FutureExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::access::AccessController;
use crate::error::{GuardianError, Result};
use crate::notify::StatusSubscription;

/// Primary service.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x4faf_c201_1fb5_459e_8fcc_c5c9_c331_914b);

/// OTP write characteristic.
pub const OTP_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xbeb5_483e_36e1_4688_b7f5_ea07_361b_26a8);

/// Status read/notify characteristic.
pub const STATUS_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xbeb5_483e_36e1_4688_b7f5_ea07_361b_26a9);

/// A running GATT peripheral. Dropping it stops advertising and removes the
/// service from BlueZ.
pub struct GattServer {
    adapter_name: String,
    _advertisement: AdvertisementHandle,
    _application: ApplicationHandle,
}

impl std::fmt::Debug for GattServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GattServer")
            .field("adapter_name", &self.adapter_name)
            .finish_non_exhaustive()
    }
}

impl GattServer {
    /// Power the default adapter, register the service and start advertising
    /// as `local_name`.
    ///
    /// # Errors
    ///
    /// Returns [`GuardianError::BluetoothAdapterNotFound`] if BlueZ has no
    /// adapter, or [`GuardianError::TransportFault`] if registration fails.
    pub async fn start(local_name: &str, controller: AccessController) -> Result<Self> {
        let session = bluer::Session::new().await?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|_| GuardianError::BluetoothAdapterNotFound)?;
        adapter.set_powered(true).await?;

        let adapter_name = adapter.name().to_string();
        info!(
            adapter = %adapter_name,
            address = %adapter.address().await?,
            local_name,
            "starting GATT peripheral"
        );

        let application = adapter
            .serve_gatt_application(application(controller))
            .await?;

        let advertisement = adapter
            .advertise(Advertisement {
                advertisement_type: AdvertisementType::Peripheral,
                service_uuids: [SERVICE_UUID].into_iter().collect(),
                discoverable: Some(true),
                local_name: Some(local_name.to_string()),
                ..Default::default()
            })
            .await?;

        info!(service = %SERVICE_UUID, "advertising");
        Ok(Self {
            adapter_name,
            _advertisement: advertisement,
            _application: application,
        })
    }

    /// Name of the adapter in use, e.g. `hci0`.
    #[must_use]
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }
}

fn application(controller: AccessController) -> Application {
    Application {
        services: vec![Service {
            uuid: SERVICE_UUID,
            primary: true,
            characteristics: vec![
                otp_characteristic(controller.clone()),
                status_characteristic(controller),
            ],
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn otp_characteristic(controller: AccessController) -> Characteristic {
    Characteristic {
        uuid: OTP_CHARACTERISTIC_UUID,
        write: Some(CharacteristicWrite {
            write: true,
            write_without_response: true,
            method: CharacteristicWriteMethod::Fun(Box::new(move |value, req| {
                let controller = controller.clone();
                async move {
                    debug!(device = %req.device_address, len = value.len(), "OTP write");
                    match controller.submit_otp(&value).await {
                        Ok(()) => Ok(()),
                        Err(GuardianError::InvalidOtp(e)) => {
                            debug!(device = %req.device_address, error = %e, "OTP write rejected");
                            Err(ReqError::Failed)
                        }
                        Err(e) => {
                            warn!(error = %e, "OTP write could not be handled");
                            Err(ReqError::Failed)
                        }
                    }
                }
                .boxed()
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn status_characteristic(controller: AccessController) -> Characteristic {
    let reader = controller.clone();
    Characteristic {
        uuid: STATUS_CHARACTERISTIC_UUID,
        read: Some(CharacteristicRead {
            read: true,
            fun: Box::new(move |req| {
                let controller = reader.clone();
                async move {
                    debug!(device = %req.device_address, "status read");
                    match controller.frame().await {
                        Ok(frame) => Ok(frame.to_vec()),
                        Err(e) => {
                            warn!(error = %e, "status read failed");
                            Err(ReqError::Failed)
                        }
                    }
                }
                .boxed()
            }),
            ..Default::default()
        }),
        notify: Some(CharacteristicNotify {
            notify: true,
            method: CharacteristicNotifyMethod::Fun(Box::new(move |notifier| {
                let subscription = controller.subscribe();
                async move {
                    tokio::spawn(forward_notifications(subscription, notifier));
                }
                .boxed()
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Relay hub frames to one subscribed central until it unsubscribes or the
/// hub goes away.
async fn forward_notifications(
    mut subscription: StatusSubscription,
    mut notifier: CharacteristicNotifier,
) {
    info!("central subscribed to status");
    loop {
        tokio::select! {
            () = notifier.stopped() => break,
            frame = subscription.next() => {
                let Some(frame) = frame else { break };
                if let Err(e) = notifier.notify(frame.to_vec()).await {
                    debug!(error = %e, "status notification failed");
                    break;
                }
            }
        }
    }
    info!("central unsubscribed from status");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuids_match_client_contract() {
        assert_eq!(
            SERVICE_UUID.to_string(),
            "4fafc201-1fb5-459e-8fcc-c5c9c331914b"
        );
        assert_eq!(
            OTP_CHARACTERISTIC_UUID.to_string(),
            "beb5483e-36e1-4688-b7f5-ea07361b26a8"
        );
        assert_eq!(
            STATUS_CHARACTERISTIC_UUID.to_string(),
            "beb5483e-36e1-4688-b7f5-ea07361b26a9"
        );
    }
}
