use eframe::egui::{self, pos2, vec2, Align2, Color32, FontId, Rect, Sense, Stroke, Ui};

use crate::color::lighten;
use crate::data::model::Table;
use crate::data::reshape::{BRACKET_COLUMN, VALUE_COLUMN};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Tree built from the long hierarchy table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    /// Remaining path below the top level, joined with " / ".
    pub label: String,
    pub value: f64,
    /// Passthrough cells, only when the leaf comes from a single row.
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub label: String,
    pub total: f64,
    pub leaves: Vec<Leaf>,
}

/// Group the long table by its first group column, then by the rest of the
/// path plus the bracket.  Only positive values take up area; order is first
/// seen.
pub fn build_nodes(table: &Table, group_cols: &[String], passthrough: &[String]) -> Vec<Node> {
    let (Some(bi), Some(vi)) = (
        table.column_index(BRACKET_COLUMN),
        table.column_index(VALUE_COLUMN),
    ) else {
        return Vec::new();
    };
    let group_idx: Vec<usize> = group_cols
        .iter()
        .filter_map(|c| table.column_index(c))
        .collect();
    let pass_idx: Vec<(&str, usize)> = passthrough
        .iter()
        .filter_map(|c| Some((c.as_str(), table.column_index(c)?)))
        .collect();

    let mut nodes: Vec<Node> = Vec::new();
    for row in &table.rows {
        let Some(value) = row[vi].as_f64().filter(|v| *v > 0.0) else {
            continue;
        };
        let (top, rest) = match group_idx.split_first() {
            Some((&first, rest)) => (row[first].key_label(), rest),
            None => (String::from("all"), &[][..]),
        };
        let label = rest
            .iter()
            .map(|&i| row[i].key_label())
            .chain([row[bi].key_label()])
            .collect::<Vec<_>>()
            .join(" / ");
        let context = pass_idx
            .iter()
            .map(|(name, i)| format!("{name}: {}", row[*i]))
            .collect::<Vec<_>>()
            .join("\n");

        let node = match nodes.iter().position(|n| n.label == top) {
            Some(pos) => &mut nodes[pos],
            None => {
                nodes.push(Node {
                    label: top,
                    total: 0.0,
                    leaves: Vec::new(),
                });
                let last = nodes.len() - 1;
                &mut nodes[last]
            }
        };
        node.total += value;
        match node.leaves.iter_mut().find(|l| l.label == label) {
            Some(leaf) => {
                leaf.value += value;
                leaf.context = None;
            }
            None => node.leaves.push(Leaf {
                label,
                value,
                context: (!context.is_empty()).then_some(context),
            }),
        }
    }
    nodes
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Slice-and-dice layout: split `rect` along one axis in proportion to
/// `weights`.  Non-positive weights get an empty rectangle.
pub fn slice_and_dice(weights: &[f64], rect: Rect, horizontal: bool) -> Vec<Rect> {
    let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
    let mut cursor = if horizontal { rect.min.x } else { rect.min.y };
    weights
        .iter()
        .map(|&w| {
            let share = if total > 0.0 && w > 0.0 { (w / total) as f32 } else { 0.0 };
            if horizontal {
                let width = rect.width() * share;
                let r = Rect::from_min_size(pos2(cursor, rect.min.y), vec2(width, rect.height()));
                cursor += width;
                r
            } else {
                let height = rect.height() * share;
                let r = Rect::from_min_size(pos2(rect.min.x, cursor), vec2(rect.width(), height));
                cursor += height;
                r
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

pub fn treemap(ui: &mut Ui, state: &AppState) {
    let Some(output) = &state.output else {
        return;
    };
    let hierarchy = &state.schema.hierarchy;
    let nodes = build_nodes(
        &output.hierarchy,
        &hierarchy.group_columns,
        &hierarchy.passthrough,
    );
    if nodes.is_empty() {
        ui.label("No positive values to lay out.");
        return;
    }

    let (response, painter) = ui.allocate_painter(ui.available_size(), Sense::hover());
    let area = response.rect.shrink(2.0);
    let pointer = response.hover_pos();
    let weights: Vec<f64> = nodes.iter().map(|n| n.total).collect();
    let mut hover: Option<String> = None;

    for (node, node_rect) in nodes.iter().zip(slice_and_dice(&weights, area, true)) {
        let base = state.key_colors.color_for(&node.label);
        let header = 18.0_f32.min(node_rect.height() / 3.0);
        let body = Rect::from_min_max(pos2(node_rect.min.x, node_rect.min.y + header), node_rect.max);

        painter.rect_filled(node_rect, 0.0, base);
        painter.text(
            node_rect.left_top() + vec2(4.0, 2.0),
            Align2::LEFT_TOP,
            &node.label,
            FontId::proportional(12.0),
            Color32::BLACK,
        );

        let leaf_weights: Vec<f64> = node.leaves.iter().map(|l| l.value).collect();
        for (i, (leaf, rect)) in node
            .leaves
            .iter()
            .zip(slice_and_dice(&leaf_weights, body, false))
            .enumerate()
        {
            let shade = if i % 2 == 0 { 0.25 } else { 0.45 };
            painter.rect_filled(rect.shrink(1.0), 0.0, lighten(base, shade));
            painter.rect_stroke(rect, 0.0, Stroke::new(1.0, base), egui::StrokeKind::Inside);
            if rect.height() > 14.0 && rect.width() > 40.0 {
                painter.text(
                    rect.left_center() + vec2(4.0, 0.0),
                    Align2::LEFT_CENTER,
                    &leaf.label,
                    FontId::proportional(10.0),
                    Color32::BLACK,
                );
            }
            if pointer.is_some_and(|p| rect.contains(p)) {
                let mut text = format!(
                    "{} / {}\nvalue: {}\n{:.1}% of {}",
                    node.label,
                    leaf.label,
                    leaf.value,
                    leaf.value / node.total * 100.0,
                    node.label
                );
                if let Some(context) = &leaf.context {
                    text.push('\n');
                    text.push_str(context);
                }
                hover = Some(text);
            }
        }
    }

    if let Some(text) = hover {
        response.on_hover_text_at_pointer(text);
    }
}
