//! 订单号与金额校验
//!
//! 订单号始终以数字串处理，不经过整数转换，前导零不会丢失。
//! 金额精度与数据库 NUMERIC(18, 2) 一致，超出精度的金额直接拒绝而不是舍入。

use rust_decimal::Decimal;

use crate::error::{LedgerError, Result};

/// 金额允许的最大小数位数
pub const AMOUNT_SCALE: u32 = 2;

/// 校验订单号是否为合法的 Luhn 数字串
///
/// 从最右侧的校验位开始编号（偏移 0），对奇数偏移的数字乘 2，
/// 乘积大于 9 时减 9，全部求和后能被 10 整除即合法。
/// 空串与含非数字字符的输入一律不合法。
pub fn is_valid_order_number(number: &str) -> bool {
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let sum: u32 = number
        .bytes()
        .rev()
        .enumerate()
        .map(|(offset, b)| {
            let digit = u32::from(b - b'0');
            if offset % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                digit
            }
        })
        .sum();

    sum % 10 == 0
}

/// 金额小数位是否不超过 [`AMOUNT_SCALE`]
///
/// 先去掉尾随零再比较，`0.010` 视为 `0.01`
pub fn has_valid_amount_scale(amount: Decimal) -> bool {
    amount.normalize().scale() <= AMOUNT_SCALE
}

/// 提现金额必须为正且精度不超过两位小数
pub(crate) fn validate_withdrawal_sum(sum: Decimal) -> Result<()> {
    if sum <= Decimal::ZERO {
        return Err(LedgerError::Validation(format!("提现金额必须大于 0: {sum}")));
    }
    if !has_valid_amount_scale(sum) {
        return Err(LedgerError::Validation(format!(
            "提现金额最多两位小数: {sum}"
        )));
    }
    Ok(())
}

/// 入账积分不能为负，精度不超过两位小数
pub(crate) fn validate_accrual(number: &str, accrual: Option<Decimal>) -> Result<()> {
    match accrual {
        Some(points) if points < Decimal::ZERO => Err(LedgerError::Validation(format!(
            "积分不能为负: order={number}"
        ))),
        Some(points) if !has_valid_amount_scale(points) => Err(LedgerError::Validation(
            format!("积分最多两位小数: order={number}, accrual={points}"),
        )),
        _ => Ok(()),
    }
}
