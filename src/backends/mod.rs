cfg_if! {
    if #[cfg(target_arch = "wasm32")] {
        compile_error!("'memsync' requires OS threads and sockets and does not support the wasm32 target.");
    } else {
        mod native;
        pub use native::{Clock, ClockError};
    }
}
