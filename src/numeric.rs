//! Log-space arithmetic shared by the inside-outside engine and forest
//! analytics. Ported from `em_utils.hpp`'s `addLogs`/`sanitizeLogProb`.

/// `log(exp(a) + exp(b))`, computed as `max + log1p(exp(-|a - b|))` so it
/// stays numerically stable for very negative inputs. `-inf` is the zero
/// sentinel and is the identity element: `add_logs(x, -inf) == x`.
pub fn add_logs(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// Clamp a value that should be a (non-positive) log-probability back
/// into range when floating point drift pushes it fractionally above
/// zero, and turn NaN into `-inf` (treated as a zero count downstream).
/// Mirrors `em_utils.hpp::sanitizeLogProb`.
pub fn sanitize_log_prob(log_prob: f64) -> f64 {
    if log_prob.is_nan() {
        return f64::NEG_INFINITY;
    }
    if log_prob > 0.0 && log_prob < 1e-9 {
        return 0.0;
    }
    log_prob
}

/// True iff `log_prob` is non-positive or is the zero sentinel,
/// i.e. a valid log-probability per spec §4.5's `is_negative` checks.
pub fn is_valid_log_prob(log_prob: f64) -> bool {
    log_prob == f64::NEG_INFINITY || log_prob <= 1e-9
}

/// Saturating point used by the real-domain derivation count to flag
/// overflow (spec §4.6).
pub const DERIVATION_COUNT_SATURATION: f64 = 1e100;

/// Sum a sequence of log-probabilities in log-space via repeated
/// `add_logs`. Empty input returns `-inf` (the additive identity).
pub fn log_sum_exp<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    values.into_iter().fold(f64::NEG_INFINITY, add_logs)
}

/// Digamma function (ψ), needed by the collapsed-variational EM update
/// (spec §4.5). There's no established crate for this in the retrieved
/// corpus, so it's implemented directly from the standard asymptotic
/// expansion (Abramowitz & Stegun 6.3.18) with the usual recurrence to
/// push small arguments into the expansion's accurate range.
pub fn digamma(mut x: f64) -> f64 {
    let mut result = 0.0;
    while x < 6.0 {
        result -= 1.0 / x;
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    result += x.ln() - 0.5 * inv
        - inv2 * (1.0 / 12.0 - inv2 * (1.0 / 120.0 - inv2 * (1.0 / 252.0 - inv2 / 240.0)));
    result
}

/// Parse one token of a weight-history CSV line (§6.3): tolerant of
/// `inf`/`-inf`/`nan` (any case, optional sign), a Unicode minus
/// (U+2212) normalised to ASCII `-`, and trailing CR/LF. Overflow
/// clamps to `±f64::MAX`; underflow clamps to signed zero.
pub fn parse_weight_token(token: &str) -> f64 {
    let token = token
        .trim_end_matches(['\r', '\n'])
        .trim()
        .replace('\u{2212}', "-");

    let lower = token.to_ascii_lowercase();
    let (sign, unsigned) = match lower.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, lower.strip_prefix('+').unwrap_or(&lower)),
    };

    match unsigned {
        "inf" | "infinity" => return sign * f64::INFINITY,
        "nan" => return f64::NAN,
        _ => {}
    }

    match token.parse::<f64>() {
        Ok(v) if v.is_infinite() => {
            if v > 0.0 {
                f64::MAX
            } else {
                -f64::MAX
            }
        }
        Ok(v) => v,
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_logs_identity() {
        assert_eq!(add_logs(f64::NEG_INFINITY, f64::NEG_INFINITY), f64::NEG_INFINITY);
        assert_eq!(add_logs(-1.0, f64::NEG_INFINITY), -1.0);
        assert_eq!(add_logs(f64::NEG_INFINITY, -1.0), -1.0);
    }

    #[test]
    fn add_logs_commutative_and_matches_direct_sum() {
        let a = -0.2;
        let b = -3.5;
        let direct = (a.exp() + b.exp()).ln();
        assert!((add_logs(a, b) - direct).abs() < 1e-12);
        assert!((add_logs(a, b) - add_logs(b, a)).abs() < 1e-12);
    }

    #[test]
    fn add_logs_associative() {
        let a = -0.1;
        let b = -2.0;
        let c = -5.0;
        let left = add_logs(add_logs(a, b), c);
        let right = add_logs(a, add_logs(b, c));
        assert!((left - right).abs() < 1e-12);
    }

    #[test]
    fn weight_token_parses_tolerant_tokens() {
        assert_eq!(parse_weight_token("inf"), f64::INFINITY);
        assert_eq!(parse_weight_token("-0.5"), -0.5);
        assert_eq!(parse_weight_token("+inf"), f64::INFINITY);
        assert!(parse_weight_token("nan").is_nan());
        assert_eq!(parse_weight_token("\u{2212}0.5"), -0.5);
        assert_eq!(parse_weight_token("7\r"), 7.0);
    }

    #[test]
    fn digamma_matches_known_values() {
        // psi(1) = -gamma (Euler-Mascheroni constant)
        assert!((digamma(1.0) - (-0.5772156649015329)).abs() < 1e-8);
        // psi(2) = 1 - gamma
        assert!((digamma(2.0) - (1.0 - 0.5772156649015329)).abs() < 1e-8);
    }
}
