//! Wires the engines together from one [`ServerConfig`].

use std::sync::Arc;

use chrono::Duration;

use crate::clock::Clock;
use crate::config::ServerConfig;
use crate::gamification::GamificationService;
use crate::nonce_authority::NonceAuthority;
use crate::notify::NotificationDispatcher;
use crate::rate_limit::SellerRateLimit;
use crate::redemption::RedemptionEngine;
use crate::transfer::TransferEngine;
use crate::wallet::WalletService;

pub struct Engine {
    pub nonces: Arc<NonceAuthority>,
    pub redemptions: RedemptionEngine,
    pub transfers: TransferEngine,
    pub gamification: GamificationService,
    pub wallet: WalletService,
}

impl Engine {
    pub fn new(
        config: &ServerConfig,
        clock: Arc<dyn Clock>,
        notifications: NotificationDispatcher,
    ) -> Self {
        let nonces = Arc::new(NonceAuthority::new(
            config.hmac_secret.as_bytes(),
            Duration::seconds(config.nonce_ttl_secs),
            Duration::seconds(config.clock_drift_secs),
            Arc::clone(&clock),
        ));
        let rate_limit = SellerRateLimit::new(
            config.rate_limit_max,
            Duration::seconds(config.rate_limit_window_secs),
        );

        Self {
            redemptions: RedemptionEngine::new(
                Arc::clone(&nonces),
                rate_limit,
                Arc::clone(&clock),
                notifications.clone(),
            ),
            transfers: TransferEngine::new(Arc::clone(&clock), notifications),
            gamification: GamificationService::new(Arc::clone(&clock)),
            wallet: WalletService::new(clock),
            nonces,
        }
    }
}
