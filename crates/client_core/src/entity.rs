//! Controllers bound to a concrete chat entity.

use std::{ops::Deref, sync::Arc};

use serde::{Deserialize, Serialize};
use shared::domain::{ChannelId, MessageId, UserId};

use crate::{
    controller::{Controller, DataState, LifecycleState},
    queue::CallbackQueue,
};

/// Channel lifecycle: `Inactive < LocalDataFetched < RemoteDataFetched <
/// {Synced, Failed}`. `Synced` means the channel follows live events;
/// `Failed` is the same depth reached unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ChannelState {
    #[default]
    Inactive,
    LocalDataFetched,
    RemoteDataFetched,
    Synced,
    Failed { reason: String },
}

impl LifecycleState for ChannelState {
    fn initial() -> Self {
        Self::Inactive
    }

    fn stage(&self) -> u8 {
        match self {
            Self::Inactive => 0,
            Self::LocalDataFetched => 1,
            Self::RemoteDataFetched => 2,
            Self::Synced | Self::Failed { .. } => 3,
        }
    }
}

impl From<DataState> for ChannelState {
    fn from(value: DataState) -> Self {
        match value {
            DataState::Inactive => Self::Inactive,
            DataState::LocalDataFetched => Self::LocalDataFetched,
            DataState::RemoteDataFetched => Self::RemoteDataFetched,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EntityController<Id, S: LifecycleState> {
    id: Id,
    controller: Controller<S>,
}

pub type ChannelController = EntityController<ChannelId, ChannelState>;
pub type MessageController = EntityController<MessageId, DataState>;
pub type UserController = EntityController<UserId, DataState>;

impl<Id, S: LifecycleState> EntityController<Id, S> {
    pub fn new(id: Id) -> Self {
        Self {
            id,
            controller: Controller::new(),
        }
    }

    pub fn with_callback_queue(id: Id, callback_queue: Arc<dyn CallbackQueue>) -> Self {
        Self {
            id,
            controller: Controller::with_callback_queue(callback_queue),
        }
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn controller(&self) -> &Controller<S> {
        &self.controller
    }
}

impl<Id, S: LifecycleState> Deref for EntityController<Id, S> {
    type Target = Controller<S>;

    fn deref(&self) -> &Self::Target {
        &self.controller
    }
}
