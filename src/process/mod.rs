//! The enrichment operation the pipeline feeds: anything implementing [`Processor`].

pub mod command;

pub use command::CommandProcessor;

use serde_json::Value;

use crate::ItemContext;

/// An enrichment operation, called once per work item from any consumer thread.
///
/// Return `Ok(Some(result))` on success, `Ok(None)` when the item produced nothing (it is not
/// marked processed), or `Err` on failure. Timeouts are the implementor's responsibility: the
/// pipeline waits as long as the call takes.
pub trait Processor: Send + Sync {
    fn process(&self, ctx: &ItemContext, payload: &Value) -> anyhow::Result<Option<Value>>;
}

impl<F> Processor for F
where
    F: Fn(&ItemContext, &Value) -> anyhow::Result<Option<Value>> + Send + Sync,
{
    fn process(&self, ctx: &ItemContext, payload: &Value) -> anyhow::Result<Option<Value>> {
        self(ctx, payload)
    }
}
