//! Per-call options: pre/post hooks and the logical database override.
//!
//! Options are assembled by applying a sequence of option functions
//! against a default [`Options`] value, mirroring the variadic option
//! pattern of the contract.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use strata_core::{Error, Result};

use crate::contract::Storage;

/// Stable code for a dynamically missing pre-hook function.
pub const ERR_REQUIRED_PRE_HOOK: &str = "ERR_REQUIRED_PRE_HOOK";

/// Stable code for a dynamically missing post-hook function.
pub const ERR_REQUIRED_POST_HOOK: &str = "ERR_REQUIRED_POST_HOOK";

/// Arguments handed to a pre- or post-operation hook.
///
/// `data` carries, depending on operation: the value being written
/// (Create/Update), the count result (Count post-hook), the retrieved or
/// listed payload (Retrieve/List post-hook), or `None`.
pub struct HookArgs<'a, P> {
    pub storage: &'a dyn Storage,
    pub id: &'a str,
    pub target: &'a str,
    pub data: Option<&'a Value>,
    pub param: &'a P,
}

/// A pre- or post-operation hook.
pub type HookFn<P> =
    Arc<dyn for<'a> Fn(HookArgs<'a, P>) -> BoxFuture<'a, Result<()>> + Send + Sync>;

/// An option applier. Several appliers are folded over the default
/// [`Options`] value; the first failure aborts the operation.
pub type OptionFn<P> = Arc<dyn Fn(&mut Options<P>) -> Result<()> + Send + Sync>;

/// Assembled per-call configuration.
pub struct Options<P> {
    /// Runs after parameters and target are resolved, before any side
    /// effect.
    pub pre_hook: Option<HookFn<P>>,
    /// Runs only when the driver call succeeded.
    pub post_hook: Option<HookFn<P>>,
    /// Logical database override, for backends that distinguish a
    /// database from the target container.
    pub database: Option<String>,
}

impl<P> std::fmt::Debug for Options<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("pre_hook", &self.pre_hook.as_ref().map(|_| "<hook>"))
            .field("post_hook", &self.post_hook.as_ref().map(|_| "<hook>"))
            .field("database", &self.database)
            .finish()
    }
}

impl<P> Default for Options<P> {
    fn default() -> Self {
        Self {
            pre_hook: None,
            post_hook: None,
            database: None,
        }
    }
}

impl<P> Options<P> {
    /// Applies each option function against defaults.
    pub fn assemble(options: Vec<OptionFn<P>>) -> Result<Self> {
        let mut assembled = Self::default();

        for option in options {
            option(&mut assembled)?;
        }

        Ok(assembled)
    }

    /// Runs the pre-hook, if one was set.
    pub async fn run_pre_hook(&self, args: HookArgs<'_, P>) -> Result<()> {
        match &self.pre_hook {
            Some(hook) => hook(args).await,
            None => Ok(()),
        }
    }

    /// Runs the post-hook, if one was set.
    pub async fn run_post_hook(&self, args: HookArgs<'_, P>) -> Result<()> {
        match &self.post_hook {
            Some(hook) => hook(args).await,
            None => Ok(()),
        }
    }
}

/// Sets the pre-hook function. A dynamically absent hook is rejected with
/// [`ERR_REQUIRED_PRE_HOOK`].
pub fn with_pre_hook<P: 'static>(hook: impl Into<Option<HookFn<P>>>) -> OptionFn<P> {
    let hook = hook.into();

    Arc::new(move |options: &mut Options<P>| {
        let hook = hook.clone().ok_or_else(|| {
            Error::required("pre-hook function").with_code(ERR_REQUIRED_PRE_HOOK)
        })?;

        options.pre_hook = Some(hook);

        Ok(())
    })
}

/// Sets the post-hook function. A dynamically absent hook is rejected with
/// [`ERR_REQUIRED_POST_HOOK`].
pub fn with_post_hook<P: 'static>(hook: impl Into<Option<HookFn<P>>>) -> OptionFn<P> {
    let hook = hook.into();

    Arc::new(move |options: &mut Options<P>| {
        let hook = hook.clone().ok_or_else(|| {
            Error::required("post-hook function").with_code(ERR_REQUIRED_POST_HOOK)
        })?;

        options.post_hook = Some(hook);

        Ok(())
    })
}

/// Overrides the logical database for backends that have one.
pub fn with_database<P>(name: impl Into<String>) -> OptionFn<P> {
    let name = name.into();

    Arc::new(move |options: &mut Options<P>| {
        if name.is_empty() {
            return Err(Error::required("database name"));
        }

        options.database = Some(name.clone());

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Count;

    #[test]
    fn test_assemble_defaults() {
        let options = Options::<Count>::assemble(Vec::new()).unwrap();
        assert!(options.pre_hook.is_none());
        assert!(options.post_hook.is_none());
        assert!(options.database.is_none());
    }

    #[test]
    fn test_with_database() {
        let options = Options::<Count>::assemble(vec![with_database("api")]).unwrap();
        assert_eq!(options.database.as_deref(), Some("api"));
    }

    #[test]
    fn test_with_database_rejects_empty() {
        let err = Options::<Count>::assemble(vec![with_database("")]).unwrap_err();
        assert!(err.is_required());
    }

    #[test]
    fn test_with_pre_hook_rejects_missing() {
        let err = Options::<Count>::assemble(vec![with_pre_hook(None)]).unwrap_err();
        assert_eq!(err.code(), Some(ERR_REQUIRED_PRE_HOOK));
    }

    #[test]
    fn test_with_post_hook_rejects_missing() {
        let err = Options::<Count>::assemble(vec![with_post_hook(None)]).unwrap_err();
        assert_eq!(err.code(), Some(ERR_REQUIRED_POST_HOOK));
    }

    #[test]
    fn test_hooks_are_stored() {
        let hook: HookFn<Count> = Arc::new(|_args| Box::pin(async { Ok(()) }));
        let options =
            Options::assemble(vec![with_pre_hook(hook.clone()), with_post_hook(hook)]).unwrap();
        assert!(options.pre_hook.is_some());
        assert!(options.post_hook.is_some());
    }
}
