use geofence_domain::DlqEntry;

/// Render a DLQ entry as a human-readable confirmation line.
pub fn render_dlq_entry(entry: &DlqEntry) -> String {
    format!(
        "{} [{}] tenant={} replayed={} error={}",
        entry.id,
        match entry.origin {
            geofence_domain::DlqOrigin::Ingest => "ingest",
            geofence_domain::DlqOrigin::Delivery => "delivery",
        },
        entry.tenant_id.as_ref().map(|t| t.as_str()).unwrap_or("-"),
        entry.replayed,
        entry.error
    )
}
