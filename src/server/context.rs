use std::sync::Arc;

use crate::audit::AuditSink;
use crate::auth::Authorizer;
use crate::db::Database;
use crate::pool::ContextPool;

pub struct ServerContext {
    pub db: Arc<Database>,

    pub authorizer: Authorizer,

    pub audit: Box<dyn AuditSink>,

    pub pool: ContextPool,

    /// Group whose members may promulgate, and who alone may write to a
    /// freshly promulgated entity.
    pub promulgators: String,
}

impl ServerContext {
    const MAX_FREE_CONTEXTS: usize = 64;

    pub fn new(
        db: Arc<Database>,
        authorizer: Authorizer,
        audit: Box<dyn AuditSink>,
        promulgators: &str,
    ) -> Self {
        Self {
            db,
            authorizer,
            audit,
            pool: ContextPool::new(Self::MAX_FREE_CONTEXTS),
            promulgators: promulgators.to_string(),
        }
    }
}
