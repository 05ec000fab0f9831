use intent_tracker::progress_events::NormalizedProgressEvent;

/// One human-readable line per accepted event.
pub fn human_line(event: &NormalizedProgressEvent) -> String {
    let step = event
        .current_step
        .map(|phase| phase.label())
        .unwrap_or_else(|| event.event_type.as_str());
    let mut line = format!("[{:>3.0}%] {step}", event.progress * 100.0);

    if let Some(metadata) = &event.metadata {
        if let (Some(done), Some(total)) =
            (metadata.processed_strategies, metadata.total_strategies)
        {
            line.push_str(&format!(" ({done}/{total} strategies)"));
        }
        if let (Some(done), Some(total)) =
            (metadata.processed_protocols, metadata.total_protocols)
        {
            line.push_str(&format!(" ({done}/{total} protocols)"));
        }
        if let Some(message) = &metadata.message {
            line.push_str(": ");
            line.push_str(message);
        }
    }
    if let Some(error) = &event.error {
        line.push_str(&format!(" [{}] {}", error.code, error.message));
    }
    if let Some(transactions) = &event.transactions {
        let plural = if transactions.len() == 1 { "" } else { "s" };
        line.push_str(&format!(" -> {} transaction{plural}", transactions.len()));
    }
    line
}
