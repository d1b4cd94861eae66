//! Plain-text rendering of command results.

use std::fmt::Write as _;

use servercon_api::{ManagedUser, ServerSummary, Snapshot};
use servercon_core::{
    Ack, CatalogEntry, ConsoleCredentials, Identity, ReachabilityState, ServerEntity,
    format_created_at, format_size,
};

pub fn identity(identity: &Identity) -> String {
    let groups = identity.groups.iter().cloned().collect::<Vec<_>>().join(", ");
    let role = if identity.is_admin() { " [admin]" } else { "" };
    format!("{}{role}\ngroups: {groups}", identity.email)
}

pub fn server_list(servers: &[ServerSummary]) -> String {
    if servers.is_empty() {
        return "No servers found.".to_string();
    }
    let width = servers
        .iter()
        .map(|server| server.domain.len())
        .max()
        .unwrap_or_default();
    let mut out = String::new();
    for server in servers {
        let due = server.nextduedate.as_deref().unwrap_or("-");
        let _ = writeln!(
            out,
            "{:>6}  {:<width$}  {:<8}  due {due}",
            server.id, server.domain, server.domainstatus
        );
    }
    out.trim_end().to_string()
}

pub fn server_detail(entity: &ServerEntity, reachability: &[ReachabilityState]) -> String {
    let mut out = format!("{} (#{}, {})\n", entity.domain, entity.id, entity.domainstatus);
    let rows = [
        ("IP", &entity.ip),
        ("OS", &entity.operatingsystem),
        ("CPU", &entity.cpu),
        ("Memory", &entity.mem),
        ("Disk", &entity.disk),
        ("Console", &entity.vncstatus),
        ("Snapshots", &entity.dailysnapshots),
    ];
    for (label, value) in rows {
        let value = if value.is_empty() { "-" } else { value.as_str() };
        let _ = writeln!(out, "  {label:<10} {value}");
    }
    if !reachability.is_empty() {
        let line = reachability
            .iter()
            .map(reachability_state)
            .collect::<Vec<_>>()
            .join(" | ");
        let _ = writeln!(out, "  {:<10} {line}", "Reachable");
    }
    out.trim_end().to_string()
}

pub fn reachability_state(state: &ReachabilityState) -> String {
    format!("{} {}", state.status.indicator(), state.subject_key)
}

pub fn ack(ack: &Ack) -> String {
    ack.summary()
}

/// Label/value rows, labels aligned.
pub fn summary(rows: &[(&'static str, String)]) -> String {
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or_default();
    rows.iter()
        .map(|(label, value)| format!("  {label:<width$}  {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn catalog(entries: &[CatalogEntry], selected: Option<u64>) -> String {
    if entries.is_empty() {
        return "  (no options available)".to_string();
    }
    entries
        .iter()
        .map(|entry| {
            let marker = if Some(entry.id) == selected { '*' } else { ' ' };
            format!(" {marker} {:>5}  {}", entry.id, entry.label)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn snapshots(snapshots: &[Snapshot], selected: Option<&str>) -> String {
    if snapshots.is_empty() {
        return "  (no snapshots available)".to_string();
    }
    snapshots
        .iter()
        .map(|snapshot| {
            let marker = if Some(snapshot.name.as_str()) == selected { '*' } else { ' ' };
            format!(
                " {marker} {} - {} ({})",
                snapshot.name,
                format_created_at(&snapshot.created_at),
                format_size(snapshot.size_gb)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn credentials(credentials: &ConsoleCredentials) -> String {
    let mut out = format!("VNC password: {}", credentials.password);
    match (&credentials.host, credentials.port) {
        (Some(host), Some(port)) => {
            let _ = write!(out, "\nVNC endpoint: {host}:{port}");
        }
        (Some(host), None) => {
            let _ = write!(out, "\nVNC host: {host}");
        }
        _ => {}
    }
    if let Some(root_password) = &credentials.root_password {
        let _ = write!(out, "\nRoot password: {root_password}");
    }
    out
}

pub fn users(users: &[ManagedUser]) -> String {
    if users.is_empty() {
        return "No users.".to_string();
    }
    users
        .iter()
        .map(|user| format!("{}  [{}]", user.email, user.groups.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use servercon_core::Reachability;

    #[test]
    fn identity_marks_admins() {
        let admin = Identity::new("root@example.com", ["*", "ops"]);
        assert_eq!(identity(&admin), "root@example.com [admin]\ngroups: *, ops");
        let user = Identity::new("dev@example.com", ["dev"]);
        assert_eq!(identity(&user), "dev@example.com\ngroups: dev");
    }

    #[test]
    fn empty_lists_render_a_notice() {
        assert_eq!(server_list(&[]), "No servers found.");
        assert_eq!(users(&[]), "No users.");
    }

    #[test]
    fn reachability_states_render_distinctly() {
        let rendered = [Reachability::Unknown, Reachability::Up, Reachability::Down].map(|status| {
            reachability_state(&ReachabilityState {
                subject_key: "10.0.0.5".to_string(),
                status,
                checked_at: None,
            })
        });
        assert_ne!(rendered[0], rendered[1]);
        assert_ne!(rendered[1], rendered[2]);
        assert_ne!(rendered[0], rendered[2]);
    }

    #[test]
    fn summary_aligns_labels() {
        let rows = vec![("Server", "web-01".to_string()), ("Type", "Application".to_string())];
        assert_eq!(summary(&rows), "  Server  web-01\n  Type    Application");
    }

    #[test]
    fn catalog_marks_selection() {
        let entries = vec![
            CatalogEntry {
                id: 7,
                label: "Debian 12".to_string(),
            },
            CatalogEntry {
                id: 8,
                label: "Ubuntu 24.04".to_string(),
            },
        ];
        assert_eq!(
            catalog(&entries, Some(8)),
            "       7  Debian 12\n *     8  Ubuntu 24.04"
        );
    }
}
