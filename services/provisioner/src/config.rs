//! Configuration for the spot provisioner.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use spotfleet_reconcile::DEFAULT_LAUNCH_TIME_OFFSET;

/// Provisioner configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Seconds between reconciliation passes.
    pub tick_interval_secs: u64,

    /// Number of handles to keep. Unset means reconcile only.
    pub target_instances: Option<usize>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Engine settings.
    pub spot: SpotSettings,

    /// Behaviour of the in-memory cloud used by the binary.
    pub simulation: SimulationConfig,
}

/// Everything the engine needs besides its remote APIs.
#[derive(Debug, Clone, Default)]
pub struct SpotSettings {
    pub pool: PoolConfig,
    pub launch: LaunchConfig,
    pub tuning: SpotTuning,
}

/// Ownership and identity of the instances this engine manages.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Resource pool name, applied as the `spotfleet-resource-pool` tag.
    pub resource_pool: String,

    /// Owner tag key. Together with `tag_value` it scopes every listing.
    pub tag_key: String,
    pub tag_value: String,

    /// Value of the `Name` tag on launched instances.
    pub instance_name: String,

    /// Endpoint agents report to, applied as `spotfleet-master-address`.
    pub master_url: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            resource_pool: "default".to_string(),
            tag_key: "spotfleet-owner".to_string(),
            tag_value: "spotfleet".to_string(),
            instance_name: "spotfleet-agent".to_string(),
            master_url: "http://127.0.0.1:8080".to_string(),
        }
    }
}

/// Shape of the instances requested.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub instance_type: String,
    pub image_id: String,
    pub ssh_key_name: String,

    /// Root volume size in GB.
    pub root_volume_size: u32,

    /// Price ceiling. `None` uses the on-demand price.
    pub spot_max_price: Option<String>,

    /// Plain-text user data; encoded before submission.
    pub user_data: String,

    pub public_ip: bool,
    pub subnet_id: Option<String>,
    pub security_group_id: Option<String>,
    pub iam_instance_profile_arn: Option<String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            instance_type: "g4dn.xlarge".to_string(),
            image_id: "ami-00000000000000000".to_string(),
            ssh_key_name: "spotfleet".to_string(),
            root_volume_size: 200,
            spot_max_price: None,
            user_data: String::new(),
            public_ip: true,
            subnet_id: None,
            security_group_id: None,
            iam_instance_profile_arn: None,
        }
    }
}

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct SpotTuning {
    /// Baseline lead added to the validity window.
    pub launch_time_offset: Duration,

    /// Creation attempts before a rejected validity window is surfaced.
    pub max_launch_attempts: u32,

    /// Validity lead of the throwaway calibration request.
    pub calibration_lead: Duration,

    /// Delay between attempts to cancel the calibration request.
    pub cancel_retry_delay: Duration,

    /// Measure clock skew when the actor starts.
    pub calibrate_on_start: bool,

    /// Validate creation calls remotely without creating any requests.
    pub dry_run: bool,
}

impl Default for SpotTuning {
    fn default() -> Self {
        Self {
            launch_time_offset: DEFAULT_LAUNCH_TIME_OFFSET,
            max_launch_attempts: 5,
            calibration_lead: Duration::from_secs(100 * 60 * 60),
            cancel_retry_delay: Duration::from_secs(2),
            calibrate_on_start: true,
            dry_run: false,
        }
    }
}

/// Simulated remote behaviour.
#[derive(Debug, Clone, Default)]
pub struct SimulationConfig {
    /// Remote clock minus local clock, in seconds.
    pub clock_skew_secs: i64,

    /// Spot API calls a new request stays unlisted for.
    pub listing_lag: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars(&lookup);
        let pool_defaults = PoolConfig::default();
        let launch_defaults = LaunchConfig::default();
        let tuning_defaults = SpotTuning::default();

        let pool = PoolConfig {
            resource_pool: vars.string("SPOTFLEET_RESOURCE_POOL", pool_defaults.resource_pool),
            tag_key: vars.string("SPOTFLEET_TAG_KEY", pool_defaults.tag_key),
            tag_value: vars.string("SPOTFLEET_TAG_VALUE", pool_defaults.tag_value),
            instance_name: vars.string("SPOTFLEET_INSTANCE_NAME", pool_defaults.instance_name),
            master_url: vars.string("SPOTFLEET_MASTER_URL", pool_defaults.master_url),
        };

        let launch = LaunchConfig {
            instance_type: vars.string("SPOTFLEET_INSTANCE_TYPE", launch_defaults.instance_type),
            image_id: vars.string("SPOTFLEET_IMAGE_ID", launch_defaults.image_id),
            ssh_key_name: vars.string("SPOTFLEET_SSH_KEY_NAME", launch_defaults.ssh_key_name),
            root_volume_size: vars
                .parse("SPOTFLEET_ROOT_VOLUME_SIZE", launch_defaults.root_volume_size)?,
            spot_max_price: vars.optional("SPOTFLEET_SPOT_MAX_PRICE"),
            user_data: vars.string("SPOTFLEET_USER_DATA", launch_defaults.user_data),
            public_ip: vars.flag("SPOTFLEET_PUBLIC_IP", launch_defaults.public_ip),
            subnet_id: vars.optional("SPOTFLEET_SUBNET_ID"),
            security_group_id: vars.optional("SPOTFLEET_SECURITY_GROUP_ID"),
            iam_instance_profile_arn: vars.optional("SPOTFLEET_IAM_INSTANCE_PROFILE_ARN"),
        };

        let tuning = SpotTuning {
            launch_time_offset: Duration::from_secs(vars.parse(
                "SPOTFLEET_LAUNCH_TIME_OFFSET_SECS",
                tuning_defaults.launch_time_offset.as_secs(),
            )?),
            calibrate_on_start: vars.flag(
                "SPOTFLEET_CALIBRATE_CLOCK_SKEW",
                tuning_defaults.calibrate_on_start,
            ),
            dry_run: vars.flag("SPOTFLEET_DRY_RUN", tuning_defaults.dry_run),
            ..tuning_defaults
        };

        let simulation = SimulationConfig {
            clock_skew_secs: vars.parse("SPOTFLEET_SIM_CLOCK_SKEW_SECS", 0)?,
            listing_lag: vars.parse("SPOTFLEET_SIM_LISTING_LAG", 0)?,
        };

        Ok(Self {
            tick_interval_secs: vars.parse("SPOTFLEET_TICK_INTERVAL", 30)?,
            target_instances: Some(vars.parse("SPOTFLEET_TARGET_INSTANCES", 0usize)?)
                .filter(|n| *n > 0),
            log_level: vars.string("SPOTFLEET_LOG_LEVEL", "info".to_string()),
            spot: SpotSettings {
                pool,
                launch,
                tuning,
            },
            simulation,
        })
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.is_empty())
    }

    fn string(&self, name: &str, default: String) -> String {
        self.optional(name).unwrap_or(default)
    }

    fn flag(&self, name: &str, default: bool) -> bool {
        self.optional(name)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }

    fn parse<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.optional(name) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid value for {name}: {raw:?}")),
            None => Ok(default),
        }
    }
}
