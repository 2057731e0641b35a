use std::{
    net::{IpAddr, Ipv4Addr},
    str::FromStr,
};

const DEFAULT_FOLD_REPEATS: bool = false;
const DEFAULT_LISTEN_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const DEFAULT_TARGET_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Options for the execution of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOpts {
    /// Execute runs of `+`, `-`, `>` and `<` as a single step.
    ///
    /// This changes how many steps a program takes, not what it computes.
    pub fold_repeats: bool,
    /// Options for the network extension.
    pub network: NetworkOpts,
}

impl Default for ExecutorOpts {
    fn default() -> Self {
        Self { fold_repeats: DEFAULT_FOLD_REPEATS, network: NetworkOpts::default() }
    }
}

impl ExecutorOpts {
    /// The default options, overridden by the `TL_FOLD_REPEATS`, `TL_NET_LISTEN_ADDR` and
    /// `TL_NET_TARGET_ADDR` environment variables when they are set.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            fold_repeats: env_or("TL_FOLD_REPEATS", DEFAULT_FOLD_REPEATS, parse_flag),
            network: NetworkOpts::from_env(),
        }
    }
}

/// Options for the network extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkOpts {
    /// The address listeners bind to.
    pub listen_addr: IpAddr,
    /// The address outgoing connections are made to.
    pub target_addr: IpAddr,
}

impl Default for NetworkOpts {
    fn default() -> Self {
        Self { listen_addr: DEFAULT_LISTEN_ADDR, target_addr: DEFAULT_TARGET_ADDR }
    }
}

impl NetworkOpts {
    /// Options that keep all the traffic on the loopback interface.
    #[must_use]
    pub fn loopback() -> Self {
        Self { listen_addr: DEFAULT_TARGET_ADDR, target_addr: DEFAULT_TARGET_ADDR }
    }

    /// The default options, overridden by the `TL_NET_LISTEN_ADDR` and `TL_NET_TARGET_ADDR`
    /// environment variables when they are set.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            listen_addr: env_or("TL_NET_LISTEN_ADDR", DEFAULT_LISTEN_ADDR, |value| {
                IpAddr::from_str(value).ok()
            }),
            target_addr: env_or("TL_NET_TARGET_ADDR", DEFAULT_TARGET_ADDR, |value| {
                IpAddr::from_str(value).ok()
            }),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read `key` from the environment, falling back to `default` when it is unset or invalid.
fn env_or<T: Copy + std::fmt::Debug>(
    key: &str,
    default: T,
    parse: impl FnOnce(&str) -> Option<T>,
) -> T {
    match std::env::var(key) {
        Ok(value) => parse(&value).unwrap_or_else(|| {
            tracing::warn!("ignoring invalid value {value:?} for {key}, using {default:?}");
            default
        }),
        Err(_) => default,
    }
}
