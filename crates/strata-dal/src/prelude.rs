//! Convenient re-exports of the common surface.

pub use strata_core::{Error, ErrorKind, Operation, Result, Status};

pub use crate::base::{resolve_target, StorageBase};
pub use crate::config::AdapterConfig;
pub use crate::contract::{list_as, retrieve_as, Storage, STORAGE_KIND};
pub use crate::fanin::{create_many, delete_many, retrieve_many, update_many};
pub use crate::fanout::{
    count_from_many, create_into_many, delete_from_many, list_from_many, retrieve_from_many,
    update_into_many, StorageMap,
};
pub use crate::options::{
    with_database, with_post_hook, with_pre_hook, HookArgs, HookFn, OptionFn, Options,
};
pub use crate::params::{self, AnyParam, Direction, SortField};
pub use crate::registry;
pub use crate::response::{ListItems, ListKeys};
