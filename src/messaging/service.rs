//! Synchronous request/response services keyed by id.
//!
//! Unlike a topic, a service call is a direct function call: the handler
//! runs on the caller's thread, with no queueing, timeout or retry.
//! Handlers are expected to be short and non-blocking.
//!
//! ```text
//!  ServiceClient::call(req) ──lookup id──▶ ServiceRegistry
//!                                              │ (lock released)
//!                                              ▼
//!                               Service::call(&req) ──▶ handler(&req) ──▶ Resp
//! ```

use core::any::Any;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use heapless::FnvIndexMap;
use log::{debug, info, warn};

use crate::error::Error;
use crate::sync::Mutex;

pub type ServiceId = u16;

/// Distinct service ids one registry can hold. Power of two (index map).
pub const MAX_SERVICES: usize = 32;

type Handler<Req, Resp> = Box<dyn Fn(&Req) -> Resp + Send + Sync>;

pub struct Service<Req, Resp> {
    id: ServiceId,
    handler: Handler<Req, Resp>,
    calls: AtomicU32,
}

impl<Req, Resp> Service<Req, Resp> {
    pub fn id(&self) -> ServiceId {
        self.id
    }

    /// Run the handler on the calling thread.
    pub fn call(&self, request: &Req) -> Resp {
        self.calls.fetch_add(1, Ordering::Relaxed);
        (self.handler)(request)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

/// Services by id. Cloning shares the same registry.
///
/// Each id holds exactly one handler for the registry's lifetime.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: Arc<Mutex<FnvIndexMap<ServiceId, Arc<dyn Any + Send + Sync>, MAX_SERVICES>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `id`. A second registration fails with
    /// [`Error::AlreadyRegistered`].
    pub fn register<Req, Resp, F>(&self, id: ServiceId, handler: F) -> crate::Result<()>
    where
        Req: 'static,
        Resp: 'static,
        F: Fn(&Req) -> Resp + Send + Sync + 'static,
    {
        let mut services = self.services.lock();
        if services.contains_key(&id) {
            warn!("Service[{}]: already registered", id);
            return Err(Error::AlreadyRegistered(id));
        }
        let service: Arc<Service<Req, Resp>> = Arc::new(Service {
            id,
            handler: Box::new(handler),
            calls: AtomicU32::new(0),
        });
        services
            .insert(id, service)
            .map_err(|_| Error::ParameterInvalid("service registry full"))?;
        info!("Service[{}]: registered", id);
        Ok(())
    }

    /// Typed handle to the service bound to `id`.
    pub fn service<Req: 'static, Resp: 'static>(
        &self,
        id: ServiceId,
    ) -> crate::Result<Arc<Service<Req, Resp>>> {
        let entry = self
            .services
            .lock()
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound(id))?;
        entry
            .downcast::<Service<Req, Resp>>()
            .map_err(|_| Error::TypeMismatch(id))
    }

    /// Look up `id` and run its handler synchronously. The registry lock
    /// is not held while the handler runs, so handlers may call other
    /// services.
    pub fn call<Req: 'static, Resp: 'static>(&self, id: ServiceId, request: &Req) -> crate::Result<Resp> {
        let service = self.service::<Req, Resp>(id).inspect_err(|e| {
            debug!("Service[{}]: call failed: {}", id, e);
        })?;
        Ok(service.call(request))
    }

    pub fn contains(&self, id: ServiceId) -> bool {
        self.services.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.services.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.lock().is_empty()
    }

    pub fn client<Req: 'static, Resp: 'static>(&self, id: ServiceId) -> ServiceClient<Req, Resp> {
        ServiceClient {
            registry: self.clone(),
            id,
            _types: PhantomData,
        }
    }
}

/// Stateless typed caller. The service is looked up at every call, so a
/// client may be created before its service registers.
pub struct ServiceClient<Req, Resp> {
    registry: ServiceRegistry,
    id: ServiceId,
    _types: PhantomData<fn(&Req) -> Resp>,
}

impl<Req, Resp> Clone for ServiceClient<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            id: self.id,
            _types: PhantomData,
        }
    }
}

impl<Req: 'static, Resp: 'static> ServiceClient<Req, Resp> {
    pub fn id(&self) -> ServiceId {
        self.id
    }

    pub fn is_available(&self) -> bool {
        self.registry.contains(self.id)
    }

    pub fn call(&self, request: &Req) -> crate::Result<Resp> {
        self.registry.call(self.id, request)
    }
}

// ── Tests ────────────────────────────────────────────────────
