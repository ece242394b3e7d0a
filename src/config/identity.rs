use std::path::Path;

pub const SERVICE_ID_FILE: &str = "service_id";

/// Reads the service id kept in `data_dir`, generating and storing one on first start.
pub fn load_or_create_service_id(data_dir: &Path) -> anyhow::Result<String> {
    let path = data_dir.join(SERVICE_ID_FILE);

    if path.exists() {
        let service_id = std::fs::read_to_string(&path)?.trim().to_string();
        if !service_id.is_empty() {
            return Ok(service_id);
        }
        tracing::warn!("Empty service id file at {}, generating a new id", path.display());
    }

    std::fs::create_dir_all(data_dir)?;
    let service_id = uuid::Uuid::new_v4().to_string();
    std::fs::write(&path, &service_id)?;

    tracing::info!("Generated service id {} in {}", service_id, path.display());
    Ok(service_id)
}
