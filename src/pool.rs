use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

use crate::audit::{AuditEntry, AuditSink};
use crate::resolve::ResolvedUrl;

/// Per-request scratch space. Holds no identity: who the request runs as is
/// always passed around as an explicit `Authorization`.
#[derive(Debug, Default)]
pub struct RequestContext {
    pub ids: Vec<ResolvedUrl>,
    pub terms: Vec<String>,
    pub audit: Vec<AuditEntry>,
}

impl RequestContext {
    /// Clears every field. Must cover each field the struct has.
    fn reset(&mut self) {
        let Self { ids, terms, audit } = self;
        ids.clear();
        terms.clear();
        audit.clear();
    }

    pub fn is_clear(&self) -> bool {
        self.ids.is_empty() && self.terms.is_empty() && self.audit.is_empty()
    }

    /// Sends the pending audit entries to `sink`.
    pub fn flush_audit(&mut self, sink: &dyn AuditSink) {
        for entry in self.audit.drain(..) {
            sink.log(&entry);
        }
    }
}

/// Free list of request contexts, reused to keep their allocations.
pub struct ContextPool {
    free: Mutex<Vec<RequestContext>>,
    max_free: usize,
}

pub struct PooledContext<'a> {
    pool: &'a ContextPool,
    ctx: RequestContext,
}

impl ContextPool {
    pub fn new(max_free: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_free,
        }
    }

    pub fn get(&self) -> PooledContext<'_> {
        let ctx = match self.free.lock() {
            Ok(mut free) => free.pop(),
            Err(_) => None,
        };
        PooledContext {
            pool: self,
            ctx: ctx.unwrap_or_default(),
        }
    }

    fn put(&self, mut ctx: RequestContext) {
        ctx.reset();
        if let Ok(mut free) = self.free.lock() {
            if free.len() < self.max_free {
                free.push(ctx);
            }
        }
    }

    pub fn free_len(&self) -> usize {
        match self.free.lock() {
            Ok(free) => free.len(),
            Err(_) => 0,
        }
    }
}

impl Deref for PooledContext<'_> {
    type Target = RequestContext;

    fn deref(&self) -> &RequestContext {
        &self.ctx
    }
}

impl DerefMut for PooledContext<'_> {
    fn deref_mut(&mut self) -> &mut RequestContext {
        &mut self.ctx
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        let ctx = std::mem::take(&mut self.ctx);
        self.pool.put(ctx);
    }
}
