use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};
use tariff_ledger::{db::CostCalculation, sync::Coverage};

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table
}

pub fn build_calculation_table(calculation: &CostCalculation) -> Table {
    let mut table = new_table();
    table.set_header(vec!["", "Excl. tax", "Incl. tax"]);
    table.add_row(vec![
        Cell::new("Energy"),
        Cell::new(calculation.cost_excl_tax - calculation.standing_cost_excl_tax).set_alignment(CellAlignment::Right),
        Cell::new(calculation.cost_incl_tax - calculation.standing_cost_incl_tax).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Standing charge"),
        Cell::new(calculation.standing_cost_excl_tax).set_alignment(CellAlignment::Right),
        Cell::new(calculation.standing_cost_incl_tax).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Total").add_attribute(Attribute::Bold),
        Cell::new(calculation.cost_excl_tax).set_alignment(CellAlignment::Right).add_attribute(Attribute::Bold),
        Cell::new(calculation.cost_incl_tax).set_alignment(CellAlignment::Right).add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec![
        Cell::new("Average rate").add_attribute(Attribute::Dim),
        Cell::new(calculation.avg_rate_excl_tax).set_alignment(CellAlignment::Right),
        Cell::new(calculation.avg_rate_incl_tax).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Consumption").add_attribute(Attribute::Dim),
        Cell::new(calculation.total_kwh).set_alignment(CellAlignment::Right),
        Cell::new(calculation.metered_kwh).set_alignment(CellAlignment::Right).fg(
            if calculation.metered_kwh.approx_eq(calculation.total_kwh, 1e-6) { Color::Reset } else { Color::DarkYellow },
        ),
    ]);
    table
}

pub fn build_coverage_table(coverages: &[Coverage]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Series", "Tariff", "Oldest", "Latest", "Records", "Inserted", "Updated", "Pages"]);
    for coverage in coverages {
        let extent = coverage.extent;
        table.add_row(vec![
            Cell::new(format!("{:?}", coverage.series)),
            Cell::new(coverage.tariff_code.as_deref().unwrap_or("-")).add_attribute(Attribute::Dim),
            Cell::new(extent.map_or_else(String::new, |extent| extent.min_start.format("%Y-%m-%d %H:%M").to_string())),
            Cell::new(extent.and_then(|extent| extent.max_end).map_or_else(
                || String::from("open"),
                |max_end| max_end.format("%Y-%m-%d %H:%M").to_string(),
            ))
            .fg(if coverage.is_complete() { Color::Green } else { Color::DarkYellow }),
            Cell::new(extent.map_or(0, |extent| extent.count)).set_alignment(CellAlignment::Right),
            Cell::new(coverage.summary.inserted).set_alignment(CellAlignment::Right),
            Cell::new(coverage.summary.updated).set_alignment(CellAlignment::Right),
            Cell::new(coverage.n_fetched_pages).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}
