use std::sync::Arc;

/// Callback invoked with the bytes accumulated by one drain batch.
///
/// Runs synchronously on the real-time drain thread: a slow callback delays
/// buffer draining and can overflow the device buffer. The slice is only
/// valid for the duration of the call, copy it to keep it. Context the
/// callback needs is captured by the closure.
pub type DeliveryCallback = Arc<dyn Fn(&[u8]) + Send + Sync + 'static>;
