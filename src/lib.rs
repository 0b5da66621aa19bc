//! Cloud Compose - multi-service projects on a remote compute platform.
//!
//! Turns a declarative project (services, networks, volumes) into remote
//! resources and keeps that mapping consistent across runs:
//! - **Planning**: Derive service groups and listeners from published ports
//! - **Provisioning**: Create or adopt volumes and service groups
//! - **Reconciliation**: Create or adopt one instance per service, by name
//! - **Refreshing**: Revalidate recorded ownership against live listings
//! - **Lifecycle**: Start, stop, fetch logs, tear down
//!
//! ## Quick Start
//!
//! Platform access is configured from environment variables. Create a `.env` file:
//!
//! ```text
//! CLOUD_API_TOKEN=your_token_here
//! CLOUD_API_URL=https://api.cloud.example/v1
//! ```
//!
//! Then reconcile a project:
//!
//! ```ignore
//! use cloud_compose::{CloudClient, CloudClientConfig, NoBuilder, Project, Reconciler, ReconcilerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CloudClient::new(CloudClientConfig::from_env()?)?;
//!     let mut project: Project = serde_yaml::from_str(&std::fs::read_to_string("project.yaml")?)?;
//!
//!     let reconciler = Reconciler::new(ReconcilerConfig::from_env(), &client, &NoBuilder);
//!     let done = reconciler.reconcile(&mut project, &[]).await?;
//!     for instance in &done.instances {
//!         println!("{} ({})", instance.name, instance.state);
//!     }
//!
//!     Ok(())
//! }
//! ```

// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Modules
// ============================================================================

/// Crate error taxonomy.
pub mod error;

/// Project, service, network and volume model.
pub mod compose_project;

/// Remote resource naming.
pub mod compose_naming;

/// Remote platform contract and REST client.
///
/// Use this module to talk to the platform, or implement its traits to fake it.
pub mod cloud_client;

/// Port and network planning, service group creation.
pub mod compose_planner;

/// Volume provisioning.
pub mod compose_provisioner;

/// Build/package collaborator seam.
pub mod compose_builder;

/// Resource reconciliation (create or adopt).
///
/// Use this module to bring a project's remote resources into existence.
pub mod compose_reconciler;

/// Recorded project status and its persistence.
pub mod compose_state;

/// Revalidation of recorded status against live resources.
pub mod compose_refresher;

/// Start, stop, logs and teardown.
pub mod compose_starter;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use cloud_client::{CloudClient, CloudClientConfig, CloudError, CloudPlatform, ResourceRef};
pub use compose_builder::{BuildOutcome, BuildRequest, ImageBuilder, NoBuilder};
pub use compose_project::{Network, Project, Service, Volume};
pub use compose_reconciler::{Reconciler, ReconcilerConfig, Reconciliation};
pub use compose_refresher::{DriftWarning, FleetRefresher, RefreshReport};
pub use compose_starter::{LifecycleDriver, LifecycleReport, TeardownReport};
pub use compose_state::{JsonFileStatusStore, ProjectStatus, StatusStore};
pub use error::{ComposeError, Result};
