//! HTML rendering of tree rows, for diagnostics.

use crate::construct::TreeRow;

const COLUMNS: [&str; 8] = [
    "id",
    "label",
    "value",
    "parent_lft",
    "lft",
    "rgt",
    "depth",
    "is_branch",
];

pub fn rows_to_table(rows: &[TreeRow]) -> String {
    let mut html = String::from("<table class=\"table table-hover\"><thead><tr>");
    for column in COLUMNS {
        html.push_str("<th>");
        html.push_str(column);
        html.push_str("</th>");
    }
    html.push_str("</tr></thead><tbody>");
    for row in rows {
        html.push_str("<tr>");
        let cells = [
            row.id.to_string(),
            row.label.clone().unwrap_or_default(),
            row.value.as_ref().map(|v| v.to_string()).unwrap_or_default(),
            row.parent_lft.map(|l| l.to_string()).unwrap_or_default(),
            row.lft.to_string(),
            row.rgt.to_string(),
            row.depth.to_string(),
            if row.is_branch { "1" } else { "0" }.to_string(),
        ];
        for cell in cells {
            html.push_str("<td>");
            html.push_str(&escape(&cell));
            html.push_str("</td>");
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
    html
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::Scalar;

    #[test]
    fn renders_and_escapes() {
        let rows = vec![TreeRow {
            id: 3,
            label: Some("<b>".into()),
            value: Some(Scalar::Text("a & b".into())),
            parent_lft: None,
            lft: 1,
            rgt: 2,
            depth: 0,
            is_branch: false,
        }];
        let html = rows_to_table(&rows);
        assert!(html.starts_with("<table"));
        assert!(html.contains("<th>parent_lft</th>"));
        assert!(html.contains("<td>&lt;b&gt;</td><td>a &amp; b</td><td></td><td>1</td>"));
        assert!(html.ends_with("</tbody></table>"));
    }

    #[test]
    fn empty_rows_still_have_a_header() {
        let html = rows_to_table(&[]);
        assert!(html.contains("<thead><tr><th>id</th>"));
        assert!(html.contains("<tbody></tbody>"));
    }
}
