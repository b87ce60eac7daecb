use std::{any::Any, collections::HashMap, fmt};

use ml_core::{Device, LossFn, Model, Optimizer};

use crate::{Config, FedErr, Monitor, Result};

/// How long a context variable stays visible. Ordered from the shortest to the longest scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Lifecycle {
    Batch,
    Epoch,
    Routine,
    Process,
}

/// Names of the variables the hooks publish.
pub mod vars {
    pub const DATA_BATCH: &str = "data_batch";
    pub const LOSS_BATCH: &str = "loss_batch";
    pub const BATCH_SIZE: &str = "batch_size";
    pub const Y_TRUE: &str = "y_true";
    pub const Y_PROB: &str = "y_prob";

    pub const SPLIT: &str = "cur_split";
    pub const NUM_SAMPLES: &str = "num_samples";
    pub const LOSS_TOTAL: &str = "loss_total";
    pub const NUM_CORRECT: &str = "num_correct";
    pub const SQUARED_ERROR: &str = "squared_error";
    pub const REPORT: &str = "routine_report";

    pub const EPOCH_LOSS: &str = "epoch_loss";
    pub const EPOCH_SAMPLES: &str = "epoch_samples";
}

struct Var {
    value: Box<dyn Any + Send>,
    lifecycle: Lifecycle,
}

/// Variables tagged with the lifecycle after which they are dropped.
///
/// A key keeps the tag it was first set with: setting it again only replaces the value.
#[derive(Default)]
pub struct VarStore {
    vars: HashMap<String, Var>,
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`. If `key` already exists its tag is kept and `lifecycle` is
    /// ignored.
    pub fn set<T: Any + Send>(&mut self, key: &str, value: T, lifecycle: Lifecycle) {
        match self.vars.get_mut(key) {
            Some(var) => var.value = Box::new(value),
            None => {
                self.vars.insert(
                    key.to_string(),
                    Var {
                        value: Box::new(value),
                        lifecycle,
                    },
                );
            }
        }
    }

    /// Returns the value under `key`, or `None` if it is unset or holds another type.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.vars.get(key)?.value.downcast_ref()
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.vars.get_mut(key)?.value.downcast_mut()
    }

    pub fn lifecycle(&self, key: &str) -> Option<Lifecycle> {
        self.vars.get(key).map(|var| var.lifecycle)
    }

    /// Moves `key` to another lifecycle. Returns `false` if `key` is unset.
    pub fn retag(&mut self, key: &str, lifecycle: Lifecycle) -> bool {
        match self.vars.get_mut(key) {
            Some(var) => {
                var.lifecycle = lifecycle;
                true
            }
            None => false,
        }
    }

    /// Removes every variable tagged `lifecycle` or shorter and returns how many were dropped.
    pub fn clear(&mut self, lifecycle: Lifecycle) -> usize {
        let before = self.vars.len();
        self.vars.retain(|_, var| var.lifecycle > lifecycle);
        before - self.vars.len()
    }

    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl fmt::Debug for VarStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.vars.iter().map(|(k, var)| (k, var.lifecycle)))
            .finish()
    }
}

/// The state the hooks of one client's run operate on.
///
/// The fields live for the whole process. Everything shorter lived goes through the variable
/// store and disappears when its lifecycle ends.
pub struct Context {
    pub cfg: Config,
    pub model: Box<dyn Model>,
    pub loss_fn: Box<dyn LossFn>,
    pub optimizer: Box<dyn Optimizer>,
    pub device: Device,
    pub monitor: Monitor,
    /// Model replicas evaluated per trainer.
    pub model_nums: usize,
    pub mirrored_models: bool,
    vars: VarStore,
}

impl Context {
    pub fn new(
        cfg: Config,
        model: Box<dyn Model>,
        loss_fn: Box<dyn LossFn>,
        optimizer: Box<dyn Optimizer>,
    ) -> Self {
        Self {
            device: cfg.device,
            model_nums: cfg.model.model_num_per_trainer,
            mirrored_models: cfg.model.mirrored_models,
            cfg,
            model,
            loss_fn,
            optimizer,
            monitor: Monitor::new(),
            vars: VarStore::new(),
        }
    }

    #[inline]
    pub fn set_var<T: Any + Send>(&mut self, key: &str, value: T, lifecycle: Lifecycle) {
        self.vars.set(key, value, lifecycle);
    }

    #[inline]
    pub fn var<T: Any>(&self, key: &str) -> Option<&T> {
        self.vars.get(key)
    }

    #[inline]
    pub fn var_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.vars.get_mut(key)
    }

    /// Returns the variable under `key`.
    ///
    /// # Errors
    /// Returns `FedErr::MissingVar` if `key` is unset, for instance because its lifecycle ended.
    pub fn require<T: Any>(&self, key: &'static str) -> Result<&T> {
        self.vars.get(key).ok_or(FedErr::MissingVar(key))
    }

    #[inline]
    pub fn clear(&mut self, lifecycle: Lifecycle) -> usize {
        self.vars.clear(lifecycle)
    }

    #[inline]
    pub fn vars(&self) -> &VarStore {
        &self.vars
    }

    #[inline]
    pub fn vars_mut(&mut self) -> &mut VarStore {
        &mut self.vars
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("device", &self.device)
            .field("model_params", &self.model.num_params())
            .field("model_nums", &self.model_nums)
            .field("mirrored_models", &self.mirrored_models)
            .field("monitor", &self.monitor)
            .field("vars", &self.vars)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_drops_the_given_lifecycle_and_shorter_ones() {
        let mut store = VarStore::new();
        store.set("b", 1_u32, Lifecycle::Batch);
        store.set("e", 2_u32, Lifecycle::Epoch);
        store.set("r", 3_u32, Lifecycle::Routine);
        store.set("p", 4_u32, Lifecycle::Process);

        assert_eq!(store.clear(Lifecycle::Epoch), 2);
        assert!(!store.contains("b") && !store.contains("e"));
        assert_eq!(store.get::<u32>("r"), Some(&3));
        assert_eq!(store.get::<u32>("p"), Some(&4));
    }

    #[test]
    fn clearing_twice_is_a_no_op() {
        let mut store = VarStore::new();
        store.set("x", 1.0_f32, Lifecycle::Batch);
        store.set("keep", 1.0_f32, Lifecycle::Routine);

        assert_eq!(store.clear(Lifecycle::Batch), 1);
        assert_eq!(store.clear(Lifecycle::Batch), 0);
        assert_eq!(store.get::<f32>("x"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn resetting_keeps_the_original_tag_until_retagged() {
        let mut store = VarStore::new();
        store.set("k", 1_i32, Lifecycle::Batch);
        store.set("k", 2_i32, Lifecycle::Process);

        assert_eq!(store.lifecycle("k"), Some(Lifecycle::Batch));
        assert_eq!(store.get::<i32>("k"), Some(&2));

        assert!(store.retag("k", Lifecycle::Routine));
        store.clear(Lifecycle::Batch);
        assert_eq!(store.get::<i32>("k"), Some(&2));
        assert!(!store.retag("missing", Lifecycle::Batch));
    }

    #[test]
    fn reading_with_the_wrong_type_is_unset() {
        let mut store = VarStore::new();
        store.set("k", 1_usize, Lifecycle::Batch);
        assert_eq!(store.get::<f32>("k"), None);

        *store.get_mut::<usize>("k").unwrap() += 1;
        assert_eq!(store.get::<usize>("k"), Some(&2));
    }
}
