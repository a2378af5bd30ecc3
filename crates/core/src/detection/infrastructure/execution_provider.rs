use ort::execution_providers::ExecutionProviderDispatch;

/// Accelerated providers to try for BlazeFace sessions on this platform.
///
/// ONNX Runtime falls back to the CPU provider when none of these register,
/// so an empty list just means CPU inference.
pub fn preferred_execution_providers() -> Vec<ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Vec::new()
    }
}
