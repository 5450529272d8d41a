//! Generic single-writer resource actor.
//!
//! A [`ResourceActor`] owns every entity of one type and is the only place
//! those entities are mutated. Callers talk to it through a cloneable
//! [`ResourceClient`]; every request carries a oneshot channel for the reply.
//! Each entity can also be observed through a `watch` channel that receives a
//! full copy of the entity after every committed mutation, so observers never
//! see a half-applied change.

use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::hash::Hash;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, instrument, warn};

// =============================================================================
// 1. THE ABSTRACTION
// =============================================================================

/// Trait that any domain entity must implement to be managed by [`ResourceActor`].
pub trait Entity: Clone + Debug + Send + Sync + 'static {
    type Id: Eq + Hash + Clone + Send + Sync + Display + Debug;
    type CreateParams: Send + Debug;
    type Action: Send + Debug;
    type ActionResult: Send + Debug;
    type Error: std::error::Error + Clone + Send + Sync + 'static;

    fn id(&self) -> &Self::Id;

    /// Construct the full entity from a freshly allocated id and its parameters.
    fn from_create_params(id: Self::Id, params: Self::CreateParams) -> Result<Self, Self::Error>;

    /// Apply a domain action. Implementations must leave `self` untouched when
    /// they return an error.
    fn handle_action(&mut self, action: Self::Action) -> Result<Self::ActionResult, Self::Error>;
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FrameworkError<E> {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Actor closed")]
    ActorClosed,
    #[error("Actor dropped the response")]
    ActorDropped,
    #[error("This actor does not generate ids; use put")]
    IdsNotGenerated,
    #[error("{0}")]
    Entity(E),
}

// =============================================================================
// 2. THE GENERIC MESSAGES
// =============================================================================

pub type Response<T, E> = oneshot::Sender<Result<T, FrameworkError<E>>>;

#[derive(Debug)]
pub enum ResourceRequest<T: Entity> {
    Create {
        params: T::CreateParams,
        respond_to: Response<T::Id, T::Error>,
    },
    /// Store a fully built entity under its own id, replacing any previous one.
    Put {
        item: T,
        respond_to: Response<(), T::Error>,
    },
    Get {
        id: T::Id,
        respond_to: Response<Option<T>, T::Error>,
    },
    /// Read several entities in one consistent pass. Missing ids are skipped.
    GetMany {
        ids: Vec<T::Id>,
        respond_to: Response<Vec<T>, T::Error>,
    },
    Delete {
        id: T::Id,
        respond_to: Response<(), T::Error>,
    },
    Action {
        id: T::Id,
        action: T::Action,
        respond_to: Response<T::ActionResult, T::Error>,
    },
    Watch {
        id: T::Id,
        respond_to: Response<watch::Receiver<T>, T::Error>,
    },
}

// =============================================================================
// 3. THE GENERIC ACTOR SERVER
// =============================================================================

pub struct ResourceActor<T: Entity> {
    receiver: mpsc::Receiver<ResourceRequest<T>>,
    store: HashMap<T::Id, T>,
    watchers: HashMap<T::Id, watch::Sender<T>>,
    next_id_fn: Option<Box<dyn Fn() -> T::Id + Send + Sync>>,
}

impl<T: Entity> ResourceActor<T> {
    pub fn new(
        buffer_size: usize,
        next_id_fn: impl Fn() -> T::Id + Send + Sync + 'static,
    ) -> (Self, ResourceClient<T>) {
        Self::build(buffer_size, Some(Box::new(next_id_fn)))
    }

    /// An actor for entities whose ids are natural keys. Entities are stored
    /// with [`ResourceClient::put`]; `create` is refused.
    pub fn keyed(buffer_size: usize) -> (Self, ResourceClient<T>) {
        Self::build(buffer_size, None)
    }

    fn build(
        buffer_size: usize,
        next_id_fn: Option<Box<dyn Fn() -> T::Id + Send + Sync>>,
    ) -> (Self, ResourceClient<T>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            store: HashMap::new(),
            watchers: HashMap::new(),
            next_id_fn,
        };
        (actor, ResourceClient::new(sender))
    }

    #[instrument(name = "resource_actor", skip(self), fields(entity = std::any::type_name::<T>()))]
    pub async fn run(mut self) {
        debug!("ResourceActor starting");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                ResourceRequest::Create { params, respond_to } => {
                    let Some(next_id) = self.next_id_fn.as_ref() else {
                        let _ = respond_to.send(Err(FrameworkError::IdsNotGenerated));
                        continue;
                    };
                    let id = next_id();
                    let result = T::from_create_params(id.clone(), params)
                        .map(|item| {
                            self.store.insert(id.clone(), item);
                            self.publish(&id);
                            id
                        })
                        .map_err(FrameworkError::Entity);
                    let _ = respond_to.send(result);
                }
                ResourceRequest::Put { item, respond_to } => {
                    let id = item.id().clone();
                    self.store.insert(id.clone(), item);
                    self.publish(&id);
                    let _ = respond_to.send(Ok(()));
                }
                ResourceRequest::Get { id, respond_to } => {
                    let _ = respond_to.send(Ok(self.store.get(&id).cloned()));
                }
                ResourceRequest::GetMany { ids, respond_to } => {
                    let items = ids
                        .iter()
                        .filter_map(|id| self.store.get(id).cloned())
                        .collect();
                    let _ = respond_to.send(Ok(items));
                }
                ResourceRequest::Delete { id, respond_to } => {
                    if self.store.remove(&id).is_some() {
                        // Dropping the sender closes every receiver of this entity.
                        self.watchers.remove(&id);
                        let _ = respond_to.send(Ok(()));
                    } else {
                        let _ = respond_to.send(Err(FrameworkError::NotFound(id.to_string())));
                    }
                }
                ResourceRequest::Action { id, action, respond_to } => {
                    let result = match self.store.get_mut(&id) {
                        Some(item) => item.handle_action(action).map_err(FrameworkError::Entity),
                        None => Err(FrameworkError::NotFound(id.to_string())),
                    };
                    if result.is_ok() {
                        self.publish(&id);
                    }
                    let _ = respond_to.send(result);
                }
                ResourceRequest::Watch { id, respond_to } => {
                    let result = match self.store.get(&id) {
                        Some(item) => {
                            let sender = self
                                .watchers
                                .entry(id)
                                .or_insert_with(|| watch::channel(item.clone()).0);
                            Ok(sender.subscribe())
                        }
                        None => Err(FrameworkError::NotFound(id.to_string())),
                    };
                    let _ = respond_to.send(result);
                }
            }
        }

        debug!("ResourceActor stopped");
    }

    fn publish(&mut self, id: &T::Id) {
        let Some(item) = self.store.get(id) else {
            return;
        };
        if let Some(sender) = self.watchers.get(id) {
            if sender.receiver_count() == 0 {
                self.watchers.remove(id);
                return;
            }
            sender.send_replace(item.clone());
        }
    }
}

// =============================================================================
// 4. THE GENERIC CLIENT
// =============================================================================

#[derive(Debug)]
pub struct ResourceClient<T: Entity> {
    sender: mpsc::Sender<ResourceRequest<T>>,
}

impl<T: Entity> Clone for ResourceClient<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T: Entity> ResourceClient<T> {
    pub(crate) fn new(sender: mpsc::Sender<ResourceRequest<T>>) -> Self {
        Self { sender }
    }

    async fn request<R>(
        &self,
        build: impl FnOnce(Response<R, T::Error>) -> ResourceRequest<T>,
    ) -> Result<R, FrameworkError<T::Error>> {
        let (respond_to, response) = oneshot::channel();
        self.sender.send(build(respond_to)).await.map_err(|_| {
            warn!("Resource actor mailbox closed");
            FrameworkError::ActorClosed
        })?;
        response.await.map_err(|_| FrameworkError::ActorDropped)?
    }

    pub async fn create(&self, params: T::CreateParams) -> Result<T::Id, FrameworkError<T::Error>> {
        self.request(|respond_to| ResourceRequest::Create { params, respond_to }).await
    }

    pub async fn put(&self, item: T) -> Result<(), FrameworkError<T::Error>> {
        self.request(|respond_to| ResourceRequest::Put { item, respond_to }).await
    }

    pub async fn get(&self, id: T::Id) -> Result<Option<T>, FrameworkError<T::Error>> {
        self.request(|respond_to| ResourceRequest::Get { id, respond_to }).await
    }

    pub async fn get_many(&self, ids: Vec<T::Id>) -> Result<Vec<T>, FrameworkError<T::Error>> {
        self.request(|respond_to| ResourceRequest::GetMany { ids, respond_to }).await
    }

    pub async fn delete(&self, id: T::Id) -> Result<(), FrameworkError<T::Error>> {
        self.request(|respond_to| ResourceRequest::Delete { id, respond_to }).await
    }

    pub async fn perform_action(
        &self,
        id: T::Id,
        action: T::Action,
    ) -> Result<T::ActionResult, FrameworkError<T::Error>> {
        self.request(|respond_to| ResourceRequest::Action { id, action, respond_to }).await
    }

    pub async fn watch(&self, id: T::Id) -> Result<watch::Receiver<T>, FrameworkError<T::Error>> {
        self.request(|respond_to| ResourceRequest::Watch { id, respond_to }).await
    }
}

// =============================================================================
// 5. TESTS
// =============================================================================
