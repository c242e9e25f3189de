//! Launchpad server.
//!
//! Serves the launchpad API alongside the static scenario editor, with
//! external scripts doing the actual provisioning.
//!
//! # Configuration
//!
//! Configuration is loaded from `launchpad.toml` in the current directory,
//! with environment variable overrides using the `LAUNCHPAD_` prefix and `__`
//! between nested keys (`LAUNCHPAD_SERVER__LISTEN_ADDR=0.0.0.0:5001`).
//!
//! ```toml
//! [server]
//! listen_addr = "127.0.0.1:5001"
//! static_dir = "static"
//!
//! [storage]
//! base_dir = "/srv/launchpad"
//!
//! [scripts.provision]
//! path = "scenario/generate_terraform.sh"
//! interpreter = "bash"
//!
//! [supervisor]
//! drain_timeout_secs = 10
//!
//! [logging]
//! directory = "logs"
//! rotation = "daily"
//! max_files = 4
//! ```

pub mod logging;
pub mod service;

pub use service::{build_router, LaunchpadService};
