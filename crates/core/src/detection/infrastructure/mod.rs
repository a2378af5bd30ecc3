pub mod execution_provider;
pub mod haar_cascade_detector;
pub mod model_resolver;
pub mod onnx_blazeface_detector;
