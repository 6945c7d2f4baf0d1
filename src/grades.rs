use serde::{Deserialize, Serialize};

/// Accepted value range for a row. Subject grade points allow 0; a semester
/// SGPA of exactly 0 is treated as not-yet-entered and must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDomain {
    GradePoints,
    Sgpa,
}

impl ValueDomain {
    fn contains(self, v: f64) -> bool {
        match self {
            ValueDomain::GradePoints => (0.0..=10.0).contains(&v),
            ValueDomain::Sgpa => v > 0.0 && v <= 10.0,
        }
    }
}

/// One raw input row: a value (grade point or SGPA) and a weight (credits).
/// Both arrive as user-typed decimal strings and may be blank.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GradeRow {
    #[serde(default, alias = "grade", alias = "sgpa")]
    pub value: String,
    #[serde(default, alias = "credits")]
    pub weight: String,
}

/// Per-row validation outcome, surfaced inline next to the offending field.
/// `Blank` covers fully-empty rows and half-filled drafts; neither is an
/// error, both are excluded from the sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RowFlag {
    Ok,
    Blank,
    InvalidValue,
    InvalidWeight,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSummary {
    pub average: f64,
    pub total_points: f64,
    pub total_weight: f64,
    pub flags: Vec<RowFlag>,
    pub calculable: bool,
}

fn parse_decimal(raw: &str) -> Option<f64> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    t.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn classify_row(row: &GradeRow, domain: ValueDomain) -> (RowFlag, Option<(f64, f64)>) {
    let value_blank = row.value.trim().is_empty();
    let weight_blank = row.weight.trim().is_empty();
    if value_blank && weight_blank {
        return (RowFlag::Blank, None);
    }

    let value = parse_decimal(&row.value);
    let weight = parse_decimal(&row.weight);

    if !value_blank && !value.map(|v| domain.contains(v)).unwrap_or(false) {
        return (RowFlag::InvalidValue, None);
    }
    if !weight_blank && !weight.map(|w| w >= 0.0).unwrap_or(false) {
        return (RowFlag::InvalidWeight, None);
    }
    if value_blank || weight_blank {
        return (RowFlag::Blank, None);
    }

    let (v, w) = (value.unwrap_or(0.0), weight.unwrap_or(0.0));
    if w > 0.0 {
        (RowFlag::Ok, Some((v, w)))
    } else {
        // Zero credits is legal input; the row simply carries no weight.
        (RowFlag::Ok, None)
    }
}

/// Weighted mean over the rows that parse cleanly and carry positive weight.
/// Malformed rows are excluded and flagged, never fatal; an empty denominator
/// yields 0.0. Recomputed from scratch on every edit, O(n).
pub fn weighted_average(rows: &[GradeRow], domain: ValueDomain) -> GradeSummary {
    let mut total_points = 0.0_f64;
    let mut total_weight = 0.0_f64;
    let mut flags = Vec::with_capacity(rows.len());

    for row in rows {
        let (flag, contribution) = classify_row(row, domain);
        if let Some((v, w)) = contribution {
            total_points += v * w;
            total_weight += w;
        }
        flags.push(flag);
    }

    let average = if total_weight > 0.0 {
        total_points / total_weight
    } else {
        0.0
    };

    GradeSummary {
        average,
        total_points,
        total_weight,
        flags,
        calculable: total_weight > 0.0,
    }
}

/// Projected CGPA after one more semester. `None` means "no projection",
/// which callers must keep distinct from a projection of zero.
pub fn predict_cgpa(
    current_average: f64,
    current_total_weight: f64,
    future_value: f64,
    future_weight: f64,
) -> Option<f64> {
    if current_total_weight <= 0.0 {
        return None;
    }
    if !ValueDomain::Sgpa.contains(future_value) || future_weight <= 0.0 {
        return None;
    }
    Some(
        (current_average * current_total_weight + future_value * future_weight)
            / (current_total_weight + future_weight),
    )
}

/// SGPA is displayed with 2 decimals, CGPA with 3.
pub fn format_sgpa(average: f64) -> String {
    format!("{average:.2}")
}

pub fn format_cgpa(average: f64) -> String {
    format!("{average:.3}")
}
