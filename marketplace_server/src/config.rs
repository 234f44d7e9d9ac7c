//! Server configuration
//!
//! Every setting comes from an `MKP_*` environment variable, read once at start-up. Invalid values are logged and
//! replaced by the default, so that a typo never stops the server from starting. Secrets are kept in [`Secret`]
//! wrappers and never printed. Run the server binary with any argument to see the full list.
use std::{env, fmt::Display, str::FromStr, time::Duration as StdDuration};

use chrono::Duration;
use log::*;
use marketplace_engine::{
    db_types::FeePayer,
    integrations::{AfterShipClient, ConfiguredCarrier, ConfiguredGateway, GatewayProxyClient, OfflineCarrier, SimulatedGateway},
    pricing::FeeSchedule,
    WebhookSecrets,
    DEFAULT_GATEWAY_TIMEOUT,
};
use mkp_common::{helpers::parse_boolean_flag, BasisPoints, Secret};
use rand::{distributions::Alphanumeric, thread_rng, Rng};

use crate::errors::ServerError;

const DEFAULT_MKP_HOST: &str = "127.0.0.1";
const DEFAULT_MKP_PORT: u16 = 8460;
const DEFAULT_AFTERSHIP_BASE_URL: &str = "https://api.aftership.com/v4";
const DEFAULT_SYNC_INTERVAL_MINS: u64 = 30;
const DEFAULT_AUTO_COMPLETE_DAYS: i64 = 7;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Apply the embedded migrations before serving requests.
    pub run_migrations: bool,
    pub auth: AuthConfig,
    pub webhooks: WebhookSecrets,
    pub gateway: GatewayConfig,
    pub carrier: CarrierConfig,
    pub fees: FeeSchedule,
    /// How often the tracking worker polls the carrier and looks for orders to auto-complete.
    pub tracking_sync_interval: StdDuration,
    /// Orders that have been `delivered` for this long are completed automatically.
    pub auto_complete_after: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MKP_HOST.to_string(),
            port: DEFAULT_MKP_PORT,
            database_url: String::default(),
            run_migrations: true,
            auth: AuthConfig::default(),
            webhooks: WebhookSecrets::default(),
            gateway: GatewayConfig::default(),
            carrier: CarrierConfig::default(),
            fees: FeeSchedule::default(),
            tracking_sync_interval: StdDuration::from_secs(DEFAULT_SYNC_INTERVAL_MINS * 60),
            auto_complete_after: Duration::days(DEFAULT_AUTO_COMPLETE_DAYS),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("MKP_HOST").ok().unwrap_or_else(|| DEFAULT_MKP_HOST.into());
        let port = parse_env_value("MKP_PORT", env::var("MKP_PORT").ok(), DEFAULT_MKP_PORT);
        let database_url = env::var("MKP_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ MKP_DATABASE_URL is not set. Please set it to the URL for the marketplace database.");
            String::default()
        });
        let run_migrations = parse_boolean_flag(env::var("MKP_RUN_MIGRATIONS").ok(), true);
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            warn!("🪛️ {e}. Reverting to the default authentication configuration.");
            AuthConfig::default()
        });
        let webhooks = webhook_secrets_from_env();
        let gateway = GatewayConfig::from_env_or_default();
        let carrier = CarrierConfig::from_env_or_default();
        let fees = fee_schedule_from_env();
        let sync_mins = parse_env_value(
            "MKP_TRACKING_SYNC_INTERVAL_MINS",
            env::var("MKP_TRACKING_SYNC_INTERVAL_MINS").ok(),
            DEFAULT_SYNC_INTERVAL_MINS,
        );
        let sync_mins = if sync_mins == 0 {
            warn!("🪛️ MKP_TRACKING_SYNC_INTERVAL_MINS must be at least 1. Using {DEFAULT_SYNC_INTERVAL_MINS}.");
            DEFAULT_SYNC_INTERVAL_MINS
        } else {
            sync_mins
        };
        let auto_complete_days = parse_env_value(
            "MKP_AUTO_COMPLETE_AFTER_DAYS",
            env::var("MKP_AUTO_COMPLETE_AFTER_DAYS").ok(),
            DEFAULT_AUTO_COMPLETE_DAYS,
        );
        let auto_complete_days = if auto_complete_days < 0 {
            warn!("🪛️ MKP_AUTO_COMPLETE_AFTER_DAYS cannot be negative. Using {DEFAULT_AUTO_COMPLETE_DAYS}.");
            DEFAULT_AUTO_COMPLETE_DAYS
        } else {
            auto_complete_days
        };
        Self {
            host,
            port,
            database_url,
            run_migrations,
            auth,
            webhooks,
            gateway,
            carrier,
            fees,
            tracking_sync_interval: StdDuration::from_secs(sync_mins * 60),
            auto_complete_after: Duration::days(auto_complete_days),
        }
    }
}

/// Parses an optional environment value, falling back to `default` (with a warning) when it cannot be read.
pub fn parse_env_value<T>(name: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match value {
        None => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
        Some(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
    }
}

fn webhook_secrets_from_env() -> WebhookSecrets {
    let stripe = Secret::from_env_value(env::var("MKP_STRIPE_WEBHOOK_SECRET").ok());
    let paypal = Secret::from_env_value(env::var("MKP_PAYPAL_WEBHOOK_SECRET").ok());
    let paytabs = Secret::from_env_value(env::var("MKP_PAYTABS_SERVER_KEY").ok());
    let carrier = Secret::from_env_value(env::var("MKP_CARRIER_WEBHOOK_SECRET").ok());
    let allow_unsigned = parse_boolean_flag(env::var("MKP_ALLOW_UNSIGNED_WEBHOOKS").ok(), false);
    for (name, secret) in [
        ("MKP_STRIPE_WEBHOOK_SECRET", &stripe),
        ("MKP_PAYPAL_WEBHOOK_SECRET", &paypal),
        ("MKP_PAYTABS_SERVER_KEY", &paytabs),
        ("MKP_CARRIER_WEBHOOK_SECRET", &carrier),
    ] {
        if secret.is_none() {
            if allow_unsigned {
                warn!("🚨️ {name} is not set and unsigned webhooks are allowed. Do not run production like this.");
            } else {
                info!("🪛️ {name} is not set. Webhooks from this source will be rejected.");
            }
        }
    }
    WebhookSecrets { stripe, paypal, paytabs, carrier, allow_unsigned }
}

fn fee_schedule_from_env() -> FeeSchedule {
    let defaults = FeeSchedule::default();
    let platform_fee = parse_env_value(
        "MKP_PLATFORM_FEE_BPS",
        env::var("MKP_PLATFORM_FEE_BPS").ok(),
        defaults.platform_fee_rate.value(),
    );
    let sales_tax =
        parse_env_value("MKP_SALES_TAX_BPS", env::var("MKP_SALES_TAX_BPS").ok(), defaults.sales_tax_rate.value());
    let fee_payer = match env::var("MKP_GATEWAY_FEE_PAYER") {
        Ok(s) => FeePayer::from_str(s.trim()).unwrap_or_else(|e| {
            warn!("🪛️ Invalid value for MKP_GATEWAY_FEE_PAYER. {e} Using {}.", defaults.fee_payer);
            defaults.fee_payer
        }),
        Err(_) => defaults.fee_payer,
    };
    let fees = FeeSchedule {
        platform_fee_rate: BasisPoints::new(platform_fee),
        sales_tax_rate: BasisPoints::new(sales_tax),
        fee_payer,
        ..defaults
    };
    info!(
        "🪛️ Fees: platform {}, sales tax {}, gateway fees paid by the {}",
        fees.platform_fee_rate, fees.sales_tax_rate, fees.fee_payer
    );
    fees
}

//-------------------------------------------------  AuthConfig  -------------------------------------------------------
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// The HS256 secret that bearer tokens are signed with. Tokens are issued elsewhere; this server only verifies them.
    pub jwt_secret: Secret<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        warn!(
            "🚨️🚨️🚨️ The JWT secret has not been set. I'm using a random value for this session, so no bearer token \
             will validate. DO NOT operate on production like this. 🚨️🚨️🚨️"
        );
        let secret = thread_rng().sample_iter(&Alphanumeric).take(48).map(char::from).collect::<String>();
        Self { jwt_secret: Secret::new(secret) }
    }
}

impl AuthConfig {
    pub fn new<S: Into<String>>(secret: S) -> Self {
        Self { jwt_secret: Secret::new(secret.into()) }
    }

    pub fn try_from_env() -> Result<Self, ServerError> {
        let secret = Secret::from_env_value(env::var("MKP_JWT_SECRET").ok())
            .ok_or_else(|| ServerError::ConfigurationError("MKP_JWT_SECRET is not set".to_string()))?;
        if secret.reveal().len() < 32 {
            warn!("🪛️ MKP_JWT_SECRET is shorter than 32 characters. Consider using a longer secret.");
        }
        Ok(Self { jwt_secret: secret })
    }
}

//-------------------------------------------------  GatewayConfig  ----------------------------------------------------
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GatewayMode {
    /// Every payment is approved on the spot. For local development and demos.
    #[default]
    Simulated,
    /// Payments are forwarded to the payment sidecar.
    Proxy,
}

impl FromStr for GatewayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simulated" => Ok(Self::Simulated),
            "proxy" => Ok(Self::Proxy),
            _ => Err(format!("Unknown gateway mode '{s}'. Expected 'simulated' or 'proxy'")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub mode: GatewayMode,
    pub proxy_url: Option<String>,
    pub proxy_api_key: Option<Secret<String>>,
    pub timeout: StdDuration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { mode: GatewayMode::default(), proxy_url: None, proxy_api_key: None, timeout: DEFAULT_GATEWAY_TIMEOUT }
    }
}

impl GatewayConfig {
    pub fn from_env_or_default() -> Self {
        let mode = match env::var("MKP_GATEWAY_MODE") {
            Ok(s) => GatewayMode::from_str(s.trim()).unwrap_or_else(|e| {
                warn!("🪛️ {e}. Using the simulated gateway.");
                GatewayMode::Simulated
            }),
            Err(_) => GatewayMode::Simulated,
        };
        let proxy_url = env::var("MKP_GATEWAY_PROXY_URL").ok().filter(|s| !s.trim().is_empty());
        let proxy_api_key = Secret::from_env_value(env::var("MKP_GATEWAY_PROXY_API_KEY").ok());
        let timeout_secs = parse_env_value(
            "MKP_GATEWAY_TIMEOUT_SECS",
            env::var("MKP_GATEWAY_TIMEOUT_SECS").ok(),
            DEFAULT_GATEWAY_TIMEOUT.as_secs(),
        );
        let mode = match (mode, &proxy_url) {
            (GatewayMode::Proxy, None) => {
                error!("🪛️ MKP_GATEWAY_MODE is 'proxy' but MKP_GATEWAY_PROXY_URL is not set. Using the simulated gateway.");
                GatewayMode::Simulated
            },
            (m, _) => m,
        };
        if mode == GatewayMode::Simulated {
            warn!("🚨️ The simulated payment gateway is active. Every payment will be approved without being charged.");
        }
        Self { mode, proxy_url, proxy_api_key, timeout: StdDuration::from_secs(timeout_secs.max(1)) }
    }

    pub fn build(&self) -> Result<ConfiguredGateway, ServerError> {
        match (self.mode, &self.proxy_url) {
            (GatewayMode::Proxy, Some(url)) => {
                let client = GatewayProxyClient::new(url, self.proxy_api_key.clone(), self.timeout)
                    .map_err(|e| ServerError::ConfigurationError(format!("Could not create the gateway client. {e}")))?;
                Ok(ConfiguredGateway::Proxy(client))
            },
            (GatewayMode::Proxy, None) => {
                Err(ServerError::ConfigurationError("Proxy gateway mode needs MKP_GATEWAY_PROXY_URL".to_string()))
            },
            (GatewayMode::Simulated, _) => Ok(ConfiguredGateway::Simulated(SimulatedGateway)),
        }
    }
}

//-------------------------------------------------  CarrierConfig  ----------------------------------------------------
#[derive(Clone, Debug)]
pub struct CarrierConfig {
    pub aftership_api_key: Option<Secret<String>>,
    pub aftership_base_url: String,
    pub timeout: StdDuration,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            aftership_api_key: None,
            aftership_base_url: DEFAULT_AFTERSHIP_BASE_URL.to_string(),
            timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }
}

impl CarrierConfig {
    pub fn from_env_or_default() -> Self {
        let aftership_api_key = Secret::from_env_value(env::var("MKP_AFTERSHIP_API_KEY").ok());
        if aftership_api_key.is_none() {
            info!("🪛️ MKP_AFTERSHIP_API_KEY is not set. Shipments will not be polled; tracking relies on sellers and webhooks.");
        }
        let aftership_base_url = env::var("MKP_AFTERSHIP_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AFTERSHIP_BASE_URL.to_string());
        Self { aftership_api_key, aftership_base_url, ..Default::default() }
    }

    pub fn build(&self) -> Result<ConfiguredCarrier, ServerError> {
        match &self.aftership_api_key {
            Some(key) => {
                let client = AfterShipClient::new(&self.aftership_base_url, key.clone(), self.timeout)
                    .map_err(|e| ServerError::ConfigurationError(format!("Could not create the AfterShip client. {e}")))?;
                Ok(ConfiguredCarrier::AfterShip(client))
            },
            None => Ok(ConfiguredCarrier::Offline(OfflineCarrier)),
        }
    }
}
