pub mod anomaly;

pub use anomaly::{parse_anomaly_id, AnomalyDetector, Detection, DetectionWarning, DetectorConfig};
