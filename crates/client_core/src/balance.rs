use std::sync::Mutex;

use shared::domain::WalletSnapshot;

/// What the presentation layer renders for the wallet balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceDisplay {
    pub show_balance: bool,
    pub formatted_balance: String,
}

/// Derives the balance display from connection state and the raw wallet
/// balance. Pure apart from memoizing the last computed pair, so
/// repeated wallet updates with unchanged inputs cost nothing.
#[derive(Default)]
pub struct BalanceReconciler {
    memo: Mutex<Option<((bool, Option<String>), BalanceDisplay)>>,
}

impl BalanceReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn derive(&self, is_connected: bool, balance: Option<&str>) -> BalanceDisplay {
        let key = (is_connected, balance.map(str::to_owned));
        {
            let memo = self.memo.lock().expect("reconciler poisoned");
            if let Some((cached_key, cached)) = memo.as_ref() {
                if *cached_key == key {
                    return cached.clone();
                }
            }
        }

        let display = BalanceDisplay {
            show_balance: is_connected && balance.is_some(),
            formatted_balance: format_two_decimals(balance),
        };
        *self.memo.lock().expect("reconciler poisoned") = Some((key, display.clone()));
        display
    }

    pub fn derive_from(&self, wallet: &WalletSnapshot) -> BalanceDisplay {
        self.derive(wallet.is_connected, wallet.balance.as_deref())
    }
}

// Rounds the decimal text half-up instead of going through f64, so
// "12.345" renders as "12.35" rather than picking up the binary
// representation error of 12.345.
fn format_two_decimals(balance: Option<&str>) -> String {
    balance
        .map(str::trim)
        .and_then(round_to_cents)
        .unwrap_or_else(|| "0.00".to_string())
}

fn round_to_cents(raw: &str) -> Option<String> {
    let (whole, frac) = match raw.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (raw, ""),
    };
    let whole = if whole.is_empty() { "0" } else { whole };
    if whole.bytes().any(|b| !b.is_ascii_digit()) || frac.bytes().any(|b| !b.is_ascii_digit()) {
        return None;
    }

    let whole: u128 = whole.parse().ok()?;
    let mut frac_digits = frac.bytes().map(|b| u128::from(b - b'0'));
    let tenths = frac_digits.next().unwrap_or(0);
    let hundredths = frac_digits.next().unwrap_or(0);
    let round_up = frac_digits.next().is_some_and(|digit| digit >= 5);

    let mut cents = whole * 100 + tenths * 10 + hundredths;
    if round_up {
        cents += 1;
    }
    Some(format!("{}.{:02}", cents / 100, cents % 100))
}
