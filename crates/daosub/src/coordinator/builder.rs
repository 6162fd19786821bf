//! Coordinator Builder

use std::sync::Arc;

use anyhow::anyhow;
use daosub_common::database::{Directory, DynDirectory, DynOrderDatabase, Error, OrderDatabase};
use daosub_common::notify::DynUserNotifier;
use daosub_common::payment::DynPaymentInitiator;

use super::{CompletionBus, Coordinator, CoordinatorSettings};

/// Subscription Coordinator builder
#[derive(Default)]
pub struct CoordinatorBuilder {
    /// Order Storage backend
    localstore: Option<DynOrderDatabase>,
    /// Directory backend
    directory: Option<DynDirectory>,
    payment: Option<DynPaymentInitiator>,
    notifier: Option<DynUserNotifier>,
    bus: Option<Arc<CompletionBus>>,
    settings: CoordinatorSettings,
}

impl std::fmt::Debug for CoordinatorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorBuilder")
            .field("settings", &self.settings)
            .finish()
    }
}

impl CoordinatorBuilder {
    /// New coordinator builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set localstore
    pub fn with_localstore(mut self, localstore: DynOrderDatabase) -> Self {
        self.localstore = Some(localstore);
        self
    }

    /// Set directory
    pub fn with_directory(mut self, directory: DynDirectory) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Use one backend as both localstore and directory
    pub fn with_store<DB>(self, store: Arc<DB>) -> Self
    where
        DB: OrderDatabase<Err = Error> + Directory<Err = Error> + Send + Sync + 'static,
    {
        self.with_localstore(store.clone()).with_directory(store)
    }

    /// Set payment initiator
    pub fn with_payment_initiator(mut self, payment: DynPaymentInitiator) -> Self {
        self.payment = Some(payment);
        self
    }

    /// Set user notifier
    pub fn with_notifier(mut self, notifier: DynUserNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Share a completion bus with other components
    pub fn with_bus(mut self, bus: Arc<CompletionBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Set all settings at once
    pub fn with_settings(mut self, settings: CoordinatorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set callback url
    pub fn with_callback_url(mut self, callback_url: String) -> Self {
        self.settings.callback_url = callback_url;
        self
    }

    /// Set network id and region attached to notifications
    pub fn with_network(mut self, network_id: String, region: String) -> Self {
        self.settings.notification.network_id = network_id;
        self.settings.notification.region = region;
        self
    }

    /// Set currency name used in notification texts
    pub fn with_currency(mut self, currency: String) -> Self {
        self.settings.notification.currency = currency;
        self
    }

    /// Build coordinator
    pub fn build(self) -> anyhow::Result<Coordinator> {
        Ok(Coordinator::new(
            self.localstore.ok_or(anyhow!("Localstore not set"))?,
            self.directory.ok_or(anyhow!("Directory not set"))?,
            self.payment.ok_or(anyhow!("Payment initiator not set"))?,
            self.notifier.ok_or(anyhow!("Notifier not set"))?,
            self.bus.unwrap_or_default(),
            self.settings,
        ))
    }
}
