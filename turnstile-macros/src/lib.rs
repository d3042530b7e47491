#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]

//! Entry point attributes for the turnstile scheduler.

mod entry;
mod parse;

/// Runs an `async fn main` to completion on a freshly built `Scheduler`.
///
/// The body becomes the root task. Tasks spawned from it with
/// `turnstile::spawn` share the same scheduler, and the function only returns
/// once every task has finished.
///
/// # Options
///
/// - `failure_policy = "propagate" | "isolate"`: what happens when a task
///   panics. Defaults to `"propagate"`.
/// - `max_rounds = N`: abort the run after `N` scheduling rounds.
///
/// # Usage
///
/// ```ignore
/// #[turnstile::main]
/// async fn main() {
///     let handle = turnstile::spawn(async { 21 * 2 });
///     assert_eq!(handle.await.unwrap(), 42);
/// }
/// ```
///
/// Equivalent code not using `#[turnstile::main]`
///
/// ```ignore
/// fn main() {
///     turnstile::runtime::Builder::new()
///         .try_build()
///         .unwrap()
///         .block_on(async {
///             let handle = turnstile::spawn(async { 21 * 2 });
///             assert_eq!(handle.await.unwrap(), 42);
///         })
/// }
/// ```
#[proc_macro_attribute]
pub fn main(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::main(args.into(), item.into()).into()
}

/// Like [`main`](macro@main) but also marks the function as a `#[test]`. Each
/// test gets its own scheduler.
///
/// ```ignore
/// #[turnstile::test(failure_policy = "isolate", max_rounds = 100)]
/// async fn my_test() {
///     turnstile::yield_now().await;
/// }
/// ```
#[proc_macro_attribute]
pub fn test(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::test(args.into(), item.into()).into()
}
