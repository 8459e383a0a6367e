use crate::commands::common::{stored_record, SessionSettings};
use crate::error::CliError;

pub fn run_status(settings: &SessionSettings, as_json: bool) -> Result<(), CliError> {
    let key = settings.options().storage_key();
    let record = stored_record(settings)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let Some(record) = record else {
        println!("No local draft for {key}");
        return Ok(());
    };

    println!("Key:        {key}");
    println!(
        "Draft:      {}",
        record
            .draft_id
            .as_ref()
            .map_or("(not created yet)", |id| id.as_str())
    );
    println!(
        "Updated at: {}",
        record.updated_at.as_deref().unwrap_or("(unknown)")
    );
    println!(
        "Last saved: {}",
        record
            .last_saved_at
            .map_or_else(|| "(never)".to_string(), |at| at.to_rfc3339())
    );
    if let Some(payload) = record.payload() {
        println!("Title:      {}", payload.title);
    }
    Ok(())
}
