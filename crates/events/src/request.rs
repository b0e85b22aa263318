/// A request expresses **intent** and is consumed by exactly one handler.
///
/// Requests carry no identity and are not persisted; the handler turns them
/// into aggregate mutations (which raise [`Notification`](crate::Notification)s)
/// and a `Response`.
///
/// ## Request vs Notification
///
/// - **Request**: intent to do something (e.g. "create order O-1"); one handler, one result
/// - **Notification**: fact that something happened (e.g. "order O-1 created"); zero or more handlers, no result
///
/// ## Design Constraints
///
/// Requests must be:
/// - **Send + Sync**: they travel through async behaviors that may hop threads
/// - **'static**: they own all their data (they are type-erased inside the pipeline)
pub trait Request: core::fmt::Debug + Send + Sync + 'static {
    /// What the handler produces on success.
    type Response: Send + 'static;

    /// Stable name used in logs and errors (defaults to the Rust type name).
    fn request_type() -> &'static str {
        std::any::type_name::<Self>()
    }
}
