use bigdecimal::{BigDecimal, Zero};

/// 缺失金额的显示文本
pub const NO_VALUE: &str = "N/A";

/// 单条记录的金额显示: 缺失时显示 "N/A", 不当作 0
pub fn display_amount(amount: Option<&BigDecimal>) -> String {
    match amount {
        Some(v) => format_currency(v),
        None => NO_VALUE.to_string(),
    }
}

/// 汇总用: 缺失金额按 0 计
pub fn sum_amounts<'a, I>(amounts: I) -> BigDecimal
where
    I: IntoIterator<Item = Option<&'a BigDecimal>>,
{
    amounts
        .into_iter()
        .flatten()
        .fold(BigDecimal::zero(), |acc, v| acc + v)
}

/// 格式化为 `$1,234.50`
pub fn format_currency(amount: &BigDecimal) -> String {
    let rounded = amount.round(2).to_string();
    let (sign, digits) = match rounded.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", rounded.as_str()),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (idx, ch) in int_part.chars().enumerate() {
        if idx > 0 && (int_part.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}${grouped}.{frac:0<2}", frac = frac_part)
}
