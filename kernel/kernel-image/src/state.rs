use crate::plan::ImagePlan;
use kernel_sync::{AlreadySet, SetOnce};

/// Boot-published subsystem state.
///
/// The image plan (and with it the memory-count table) is computed exactly
/// once, on the boot core, before any other core is released; afterwards it
/// is read-only everywhere. [`SetOnce`] enforces the single publication and
/// orders it against readers.
pub struct BootState {
    plan: SetOnce<ImagePlan>,
}

impl BootState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            plan: SetOnce::new(),
        }
    }

    /// Publish the plan. Fails if one was already published.
    ///
    /// # Errors
    /// - [`AlreadySet`] on a second publication attempt.
    pub fn publish_plan(&self, plan: ImagePlan) -> Result<(), AlreadySet> {
        self.plan.set(plan)
    }

    /// The published plan, if boot has published one.
    #[inline]
    #[must_use]
    pub fn plan(&self) -> Option<&ImagePlan> {
        self.plan.get()
    }
}

impl Default for BootState {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide boot state.
pub static BOOT_STATE: BootState = BootState::new();
