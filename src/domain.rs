use serde::{Deserialize, Serialize};

/// labels the device-local stand-in model can produce
pub const LOCAL_LABELS: [&str; 4] = ["Excelente", "Boa", "Regular", "Ruim"];

/// labels the server stand-in model can produce
pub const SERVER_LABELS: [&str; 4] = [
    "Qualidade Superior",
    "Qualidade Padrão",
    "Necessita Atenção",
    "Crítico",
];

/// server answered with a non-200 status
pub const COMMUNICATION_FAILURE: &str = "Falha na comunicação com o servidor";
/// transport error, or a 200 whose body is not json
pub const COMMUNICATION_EXCEPTION: &str = "Exceção na comunicação";
/// 200 with a json body that has no `classification`
pub const MISSING_CLASSIFICATION: &str = "Erro na resposta do servidor";

/// source tag for records classified on the device
pub const SOURCE_LOCAL: &str = "local_esp32";
/// source tag for records confirmed by the ingestion server
pub const SOURCE_REMOTE_CONFIRM: &str = "remote_server_confirm";
/// `processed_by` tag written by the ingestion server
pub const PROCESSED_BY_SERVER: &str = "remote_server";

/// one entry of the result store (results.json)
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ResultRecord {
    /// iso-8601 generation time
    pub timestamp: String,
    /// stored image name, relative to the image directory
    pub image_filename: String,
    pub classification: String,
    pub processed_by: String,
}

/// 200 body of POST /process_image
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ProcessImageResponse {
    pub classification: String,
    pub image_saved_as: String,
}

/// 4xx/5xx body of the ingestion server
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}
