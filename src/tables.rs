use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::entity::Reading;

pub fn build_readings_table(readings: &[Reading]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table.set_header(vec!["Entity", "Value", "Unit", "Class"]);
    for reading in readings {
        let value_cell = reading.value.map_or_else(
            || Cell::new("unknown").fg(Color::Red),
            |value| Cell::new(format!("{value:.2}")),
        );
        table.add_row(vec![
            Cell::new(&reading.entity_id).add_attribute(Attribute::Dim),
            value_cell.set_alignment(CellAlignment::Right),
            Cell::new(reading.unit),
            Cell::new(format!("{:?}", reading.device_class)),
        ]);
    }
    table
}
