/**
 * TABLES HTML - Projection d'une collection indexée en lignes de tableau
 *
 * Une ligne par entité, une cellule par colonne. L'identité des lignes est
 * la clé de la collection : seules les lignes réellement ajoutées, modifiées
 * ou retirées reçoivent une classe de transition (enter / update / exit),
 * le CSS du dashboard se charge du fondu.
 */

use crate::collection::Keyed;
use crate::models::{Lease, Node, Role};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt::Write;
use time::macros::format_description;
use time::OffsetDateTime;

/// Colonne : titre + sélecteur de valeur.
pub struct Column<T> {
    pub title: &'static str,
    pub value: fn(&T) -> String,
}

impl<T> Column<T> {
    pub fn new(title: &'static str, value: fn(&T) -> String) -> Self {
        Column { title, value }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableDiff {
    pub entered: Vec<String>,
    pub updated: Vec<String>,
    pub exited: Vec<String>,
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.updated.is_empty() && self.exited.is_empty()
    }
}

const MAX_PENDING_EXITS: usize = 256;

pub struct TableView<T> {
    columns: Vec<Column<T>>,
    rows: IndexMap<String, Vec<String>>,
    // lignes sorties pas encore rendues, vidées au rendu suivant avec "exit"
    exiting: Vec<(String, Vec<String>)>,
    last_diff: TableDiff,
}

impl<T: Keyed> TableView<T> {
    pub fn new(columns: Vec<Column<T>>) -> Self {
        Self {
            columns,
            rows: IndexMap::new(),
            exiting: Vec::new(),
            last_diff: TableDiff::default(),
        }
    }

    pub fn titles(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.title).collect()
    }

    pub fn row(&self, key: &str) -> Option<&[String]> {
        self.rows.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last_diff(&self) -> &TableDiff {
        &self.last_diff
    }

    /// Recalcule toutes les lignes et retourne les transitions.
    pub fn refresh<'a, I>(&mut self, items: I) -> TableDiff
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let mut next: IndexMap<String, Vec<String>> = IndexMap::new();
        for item in items {
            let cells = self.columns.iter().map(|c| (c.value)(item)).collect();
            next.insert(item.key().to_string(), cells);
        }

        let mut diff = TableDiff::default();
        for (key, cells) in &next {
            match self.rows.get(key) {
                None => diff.entered.push(key.clone()),
                Some(old) if old != cells => diff.updated.push(key.clone()),
                Some(_) => {}
            }
        }

        // une ligne revenue avant d'avoir été rendue ne sort plus
        self.exiting.retain(|(key, _)| !next.contains_key(key));
        for (key, cells) in self.rows.drain(..) {
            if !next.contains_key(&key) {
                diff.exited.push(key.clone());
                self.exiting.retain(|(k, _)| k != &key);
                self.exiting.push((key, cells));
            }
        }
        if self.exiting.len() > MAX_PENDING_EXITS {
            let overflow = self.exiting.len() - MAX_PENDING_EXITS;
            self.exiting.drain(..overflow);
        }

        self.rows = next;
        self.last_diff = diff.clone();
        diff
    }

    /// Rend le tableau. Les lignes sorties ne sont émises qu'une fois.
    pub fn render_html(&mut self) -> String {
        let mut html = String::from("<table>\n<thead><tr>");
        for column in &self.columns {
            let _ = write!(html, "<th>{}</th>", escape(column.title));
        }
        html.push_str("</tr></thead>\n<tbody>\n");

        for (key, cells) in &self.rows {
            let class = if self.last_diff.entered.contains(key) {
                " class=\"enter\""
            } else if self.last_diff.updated.contains(key) {
                " class=\"update\""
            } else {
                ""
            };
            push_row(&mut html, key, class, cells);
        }
        for (key, cells) in self.exiting.drain(..) {
            push_row(&mut html, &key, " class=\"exit\"", &cells);
        }

        html.push_str("</tbody>\n</table>\n");
        html
    }
}

fn push_row(html: &mut String, key: &str, class: &str, cells: &[String]) {
    let _ = write!(html, "<tr data-key=\"{}\"{}>", escape(key), class);
    for cell in cells {
        let _ = write!(html, "<td>{}</td>", escape(cell));
    }
    html.push_str("</tr>\n");
}

/// Échappement HTML minimal pour le contenu texte et les attributs.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Ex: "Thu, Jan 1, 2099, 00:00:00" (UTC).
pub fn format_date(ts: OffsetDateTime) -> String {
    let format = format_description!(
        "[weekday repr:short], [month repr:short] [day padding:none], [year], [hour]:[minute]:[second]"
    );
    ts.format(&format).unwrap_or_default()
}

fn flag(set: bool) -> String {
    if set { "x".to_string() } else { String::new() }
}

fn opt_date(ts: Option<OffsetDateTime>) -> String {
    ts.map(format_date).unwrap_or_default()
}

pub fn node_columns() -> Vec<Column<Node>> {
    type C = Column<Node>;
    vec![
        C::new("RLOC16", |n| n.rloc16.clone()),
        C::new("Router ID", |n| n.id.clone().unwrap_or_default()),
        C::new("Leader", |n| flag(n.has_role(Role::Leader))),
        C::new("Border Router", |n| flag(n.is_border_router())),
        C::new("Router", |n| flag(n.is_router())),
        C::new("End Device", |n| flag(!n.is_router())),
        C::new("Active", |n| if n.is_live() { "yes".into() } else { "no".into() }),
        C::new("First seen", |n| opt_date(n.first_seen)),
        C::new("Last seen", |n| opt_date(n.last_seen)),
    ]
}

pub fn lease_columns() -> Vec<Column<Lease>> {
    type C = Column<Lease>;
    vec![
        C::new("DUID", |l| l.duid.clone()),
        C::new("Global address", |l| l.gua.clone()),
        C::new("Expiration", |l| format_date(l.expires)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leases::LeaseBook;
    use crate::topology::Topology;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn date_format() {
        assert_eq!(format_date(datetime!(2099-01-01 0:00 UTC)), "Thu, Jan 1, 2099, 00:00:00");
    }

    #[test]
    fn lease_row_end_to_end() {
        let mut book = LeaseBook::new();
        let leases: Vec<Lease> = serde_json::from_value(json!([
            {"duid": "x", "gua": "2001:db8::1", "expires": "2099-01-01T00:00:00Z"}
        ]))
        .unwrap();
        book.apply_snapshot(leases.clone(), datetime!(2026-01-01 0:00 UTC));

        let mut table = TableView::new(lease_columns());
        let diff = table.refresh(book.leases().iter());
        assert_eq!(diff.entered, vec!["2001:db8::1"]);
        assert_eq!(
            table.row("2001:db8::1").unwrap(),
            &["x".to_string(), "2001:db8::1".to_string(), "Thu, Jan 1, 2099, 00:00:00".to_string()]
        );

        book.apply_snapshot(leases, datetime!(2099-01-01 0:00:01 UTC));
        let diff = table.refresh(book.leases().iter());
        assert_eq!(diff.exited, vec!["2001:db8::1"]);
        assert!(table.is_empty());
        assert!(table.render_html().contains("<tr data-key=\"2001:db8::1\" class=\"exit\">"));
        assert!(!table.render_html().contains("2001:db8::1"));
    }

    #[test]
    fn exit_survives_a_second_refresh_before_render() {
        let mut book = LeaseBook::new();
        let leases: Vec<Lease> = serde_json::from_value(json!([
            {"duid": "x", "gua": "2001:db8::1", "expires": "2099-01-01T00:00:00Z"},
            {"duid": "y", "gua": "2001:db8::2", "expires": "2100-01-01T00:00:00Z"}
        ]))
        .unwrap();
        let mut table = TableView::new(lease_columns());
        book.apply_snapshot(leases.clone(), datetime!(2098-01-01 0:00 UTC));
        table.refresh(book.leases().iter());
        table.render_html();

        let now = datetime!(2099-01-02 0:00 UTC);
        book.prune_expired(now);
        assert_eq!(table.refresh(book.leases().iter()).exited, vec!["2001:db8::1"]);
        book.apply_snapshot(leases, now);
        assert!(table.refresh(book.leases().iter()).is_empty());

        let html = table.render_html();
        assert!(html.contains("<tr data-key=\"2001:db8::1\" class=\"exit\">"));
        assert!(html.contains("<tr data-key=\"2001:db8::2\">"));
    }

    #[test]
    fn returning_row_cancels_its_exit() {
        let mut table = TableView::new(node_columns());
        let node: Node = serde_json::from_value(json!({"rloc16": "0400", "roles": ["router"]})).unwrap();
        table.refresh([&node]);
        table.refresh(std::iter::empty());
        let diff = table.refresh([&node]);
        assert_eq!(diff.entered, vec!["0400"]);
        assert!(!table.render_html().contains("class=\"exit\""));
    }

    #[test]
    fn unchanged_rows_have_no_transition() {
        let mut topo = Topology::new();
        let snapshot: Vec<Node> =
            serde_json::from_value(json!([{"rloc16": "1000", "active": "yes", "roles": ["leader"]}])).unwrap();
        topo.apply_snapshot(snapshot.clone()).unwrap();

        let mut table = TableView::new(node_columns());
        let first = table.refresh(topo.devices());
        assert_eq!(first.entered, vec!["1000"]);

        topo.apply_snapshot(snapshot).unwrap();
        let second = table.refresh(topo.devices());
        assert!(second.is_empty());
        assert_eq!(table.len(), 1);

        let html = table.render_html();
        assert!(html.contains("<tr data-key=\"1000\"><td>1000</td><td></td><td>x</td>"));
        assert!(!html.contains("class=\"enter\""));
    }

    #[test]
    fn node_flags_and_updates() {
        let mut table = TableView::new(node_columns());
        let router: Node = serde_json::from_value(json!({"rloc16": "0400", "id": "1", "roles": ["router"]})).unwrap();
        table.refresh([&router]);
        assert_eq!(table.row("0400").unwrap()[4], "x");
        assert_eq!(table.row("0400").unwrap()[5], "");

        let mut promoted = router.clone();
        promoted.roles.push(Role::Leader);
        let diff = table.refresh([&promoted]);
        assert_eq!(diff.updated, vec!["0400"]);
        assert!(table.render_html().contains("class=\"update\""));
    }

    #[test]
    fn cells_are_escaped() {
        assert_eq!(escape("<b>\"a&b\"</b>"), "&lt;b&gt;&quot;a&amp;b&quot;&lt;/b&gt;");
    }
}
