// Utilitários para manipulação de valores monetários

/// Converts a decimal currency amount into integer minor units (cents).
///
/// The result is exactly `round(amount * 100)`. Callers validate that the
/// amount is positive and finite before calling this.
pub fn to_cents(amount: f64) -> u64 {
    (amount * 100.0).round() as u64
}

pub fn is_valid_amount(amount: f64) -> bool {
    amount.is_finite() && amount > 0.0 && to_cents(amount) > 0
}

/// Formats an amount the way the checkout displays it, e.g. `R$ 24,80`.
pub fn format_brl(amount: f64) -> String {
    let cents = to_cents(amount.max(0.0));
    format!("R$ {},{:02}", cents / 100, cents % 100)
}
