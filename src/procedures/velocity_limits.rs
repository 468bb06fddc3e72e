//! Velocity-limit snapshot and scoped override.
//!
//! The sweep needs a known acceleration, a permissive square corner velocity and no
//! minimum cruise ratio, so it rewrites the toolhead's velocity limits for its duration.
//! [`VelocityLimitScope`] captures the limits, applies the test values and restores the
//! captured values on every exit path of the body it runs.
//!
//! ```rust,ignore
//! let scope = VelocityLimitScope::enter(toolhead, 3000).await?;
//! let measurements = scope.run(sweep_body()).await?; // limits restored here, Ok or Err
//! ```

use std::future::Future;

use crate::error::{SweepError, SweepResult};
use crate::hardware::capabilities::{MachineStatus, Toolhead, VelocityLimits};
use crate::procedures::panic_safety::PanicGuard;

/// Square corner velocity used while testing (mm/s)
pub const TEST_CORNER_VELOCITY: f64 = 5.0;

/// Minimum cruise ratio used while testing, when the machine supports it
pub const TEST_CRUISE_RATIO: f64 = 0.0;

/// The velocity limits in force before the sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityLimitSnapshot {
    previous: VelocityLimits,
}

impl VelocityLimitSnapshot {
    /// Capture the limits from a status report
    pub fn from_status(status: &MachineStatus) -> Self {
        Self {
            previous: status.limits,
        }
    }

    /// Limits that were in force when the snapshot was taken
    pub fn previous(&self) -> &VelocityLimits {
        &self.previous
    }

    /// Whether the machine exposes a minimum cruise ratio
    pub fn has_cruise_ratio(&self) -> bool {
        self.previous.cruise_ratio.is_some()
    }

    /// Limits to apply for the test.
    ///
    /// The cruise ratio is only set when the machine reported one.
    pub fn test_limits(&self, accel: u32) -> VelocityLimits {
        VelocityLimits {
            max_accel: f64::from(accel),
            corner_velocity: TEST_CORNER_VELOCITY,
            cruise_ratio: self.previous.cruise_ratio.map(|_| TEST_CRUISE_RATIO),
        }
    }
}

/// Test velocity limits held for the lifetime of a sweep body.
///
/// `restore` consumes the scope, so the captured limits can be written back at most once.
/// A scope dropped without restoring (cancelled future, panic) logs an error through its
/// [`PanicGuard`].
#[must_use = "dropping the scope without `run` or `restore` leaves the test limits applied"]
pub struct VelocityLimitScope<'a> {
    toolhead: &'a dyn Toolhead,
    snapshot: VelocityLimitSnapshot,
    guard: PanicGuard,
}

impl<'a> VelocityLimitScope<'a> {
    /// Capture the current limits and apply the test limits.
    ///
    /// If the test limits cannot be applied, the captured limits are written back before the
    /// error is returned.
    pub async fn enter(toolhead: &'a dyn Toolhead, accel: u32) -> SweepResult<Self> {
        let status = toolhead.status().await.map_err(SweepError::Hardware)?;
        let snapshot = VelocityLimitSnapshot::from_status(&status);
        let previous = *snapshot.previous();

        tracing::info!(
            accel = previous.max_accel,
            corner_velocity = previous.corner_velocity,
            cruise_ratio = ?previous.cruise_ratio,
            "Captured velocity limits"
        );

        let guard = PanicGuard::named("velocity limits", move || {
            tracing::error!(
                ?previous,
                "Sweep abandoned before restoring velocity limits; machine left in test configuration"
            );
        });
        let scope = Self {
            toolhead,
            snapshot,
            guard,
        };

        let test_limits = scope.snapshot.test_limits(accel);
        if let Err(e) = toolhead.set_velocity_limits(&test_limits).await {
            tracing::error!("Failed to apply test velocity limits: {}", e);
            if let Err(restore_err) = scope.restore().await {
                tracing::error!("Restore after failed apply also failed: {}", restore_err);
            }
            return Err(SweepError::Hardware(e));
        }

        tracing::debug!(?test_limits, "Applied test velocity limits");
        Ok(scope)
    }

    /// Captured snapshot
    pub fn snapshot(&self) -> &VelocityLimitSnapshot {
        &self.snapshot
    }

    /// Run `body` with the test limits applied, then restore the captured limits.
    ///
    /// The restore runs whether the body succeeds or fails. A body error takes precedence
    /// over a restore error; the restore error is still logged.
    pub async fn run<T, F>(self, body: F) -> SweepResult<T>
    where
        F: Future<Output = SweepResult<T>>,
    {
        let outcome = body.await;
        let restored = self.restore().await;

        match (outcome, restored) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(restore_err)) => Err(restore_err),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(restore_err)) => {
                tracing::error!("Velocity limit restore failed after sweep error: {}", restore_err);
                Err(e)
            }
        }
    }

    /// Write the captured limits back.
    pub async fn restore(self) -> SweepResult<()> {
        let Self {
            toolhead,
            snapshot,
            guard,
        } = self;
        guard.dismiss();

        let previous = snapshot.previous();
        let result = toolhead
            .set_velocity_limits(previous)
            .await
            .map_err(SweepError::Hardware);

        match &result {
            Ok(()) => tracing::info!(?previous, "Restored velocity limits"),
            Err(e) => tracing::error!("Failed to restore velocity limits: {}", e),
        }
        result
    }
}
