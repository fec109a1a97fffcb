//! End-to-end decision scenarios through the pure core:
//! candles → Heikin-Ashi → oscillator → gate → aggregate → plan.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;

use hatrend_core::domain::{Candle, PortfolioSnapshot, SignalValue, Timeframe};
use hatrend_core::gate::{CooldownGate, GateKey, GateTransition};
use hatrend_core::indicators::{HeikinAshiTransformer, IndicatorError, OscillatorIndicator};
use hatrend_core::planner::{Action, AllocationPlanner};
use hatrend_core::{SignalAggregator, StrategyConfig};

// ── Helpers ──────────────────────────────────────────────────────────

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Hourly candles following `closes`, with a one-point wick on each side.
fn candles(closes: &[f64]) -> Vec<Candle> {
    let mut prev = closes.first().copied().unwrap_or(0.0);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = prev;
            prev = close;
            Candle::new(
                t0() + Duration::hours(i as i64),
                open,
                open.max(close) + 1.0,
                (open.min(close) - 1.0).max(0.0),
                close,
                1_000.0,
            )
        })
        .collect()
}

fn rally() -> Vec<f64> {
    let mut closes = vec![100.0; 40];
    closes.extend((1..=12).map(|i| 100.0 + 2.0 * i as f64));
    closes
}

fn selloff() -> Vec<f64> {
    let mut closes = vec![100.0; 40];
    closes.extend((1..=12).map(|i| 100.0 - 2.0 * i as f64));
    closes
}

fn timeframes() -> [Timeframe; 3] {
    [Timeframe::M30, Timeframe::H1, Timeframe::H2]
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn all_bullish_five_symbols_buys_to_target() {
    let config = StrategyConfig::default();
    let osc = OscillatorIndicator::new(config.period);
    let aggregator = SignalAggregator::from_config(&config).unwrap();
    let planner = AllocationPlanner::new(config.min_trade_threshold_usd);

    let reading = osc.evaluate_raw(&candles(&rally())).unwrap();
    assert_eq!(reading.signal, SignalValue::Bullish);

    let signals: BTreeMap<_, _> = timeframes().into_iter().map(|tf| (tf, reading.signal)).collect();
    let weight = aggregator.weight(&signals);
    assert_eq!(weight, 1.0);

    let symbols = ["BTCUSDC", "FETUSDC", "LINKUSDC", "XLMUSDC", "SOLUSDC"];
    let snapshot = symbols.iter().fold(
        PortfolioSnapshot::new(10_000.0, 7_500.0, t0()),
        |s, sym| s.with_position(*sym, 500.0, 10.0),
    );
    for sym in symbols {
        let plan = planner.plan(sym, weight, &snapshot, 0.2).unwrap();
        assert_eq!(
            plan.action,
            Action::Buy {
                amount_usd: 1_500.0,
                capital_limited: false
            }
        );
    }
}

#[test]
fn suppressed_flip_inside_lock_leaves_weight_and_plan_unchanged() {
    let config = StrategyConfig::default();
    let gate = CooldownGate::from_config(&config);
    let aggregator = SignalAggregator::from_config(&config).unwrap();
    let planner = AllocationPlanner::new(config.min_trade_threshold_usd);

    let bull = OscillatorIndicator::default()
        .evaluate_raw(&candles(&rally()))
        .unwrap()
        .signal;
    let bear = OscillatorIndicator::default()
        .evaluate_raw(&candles(&selloff()))
        .unwrap()
        .signal;
    assert_eq!((bull, bear), (SignalValue::Bullish, SignalValue::Bearish));

    let observe = |raw: [SignalValue; 3], now| -> BTreeMap<Timeframe, SignalValue> {
        timeframes()
            .into_iter()
            .zip(raw)
            .map(|(tf, s)| {
                let out = gate.evaluate(&GateKey::new("BTCUSDC", tf), s, now).unwrap();
                (tf, out.effective)
            })
            .collect()
    };

    observe([bull, bull, bull], t0() - Duration::minutes(30));
    // 30m reverses; its 15-minute lock starts now.
    let locked = observe([bear, bull, bull], t0());
    let weight = aggregator.weight(&locked);
    assert!((weight - 0.8).abs() < 1e-12);

    let snapshot = PortfolioSnapshot::new(10_000.0, 5_000.0, t0()).with_position(
        "BTCUSDC",
        10_000.0 * 0.2 * weight,
        10.0,
    );
    planner.plan("BTCUSDC", weight, &snapshot, 0.2).unwrap();

    // Five minutes later the 30m signal tries to flip back.
    let later = t0() + Duration::minutes(5);
    let key = GateKey::new("BTCUSDC", Timeframe::M30);
    let signals = observe([bull, bull, bull], later);
    assert_eq!(signals[&Timeframe::M30], SignalValue::Bearish);
    assert!(matches!(
        gate.record(&key).and_then(|r| r.lock().copied()).map(|l| l.expiry),
        Some(e) if e == later + Duration::minutes(15)
    ));

    let again = aggregator.weight(&signals);
    assert_eq!(again, weight);
    assert_eq!(planner.last_weight("BTCUSDC"), Some(weight));
    let plan = planner.plan("BTCUSDC", again, &snapshot, 0.2).unwrap();
    assert_eq!(plan.action, Action::None);
}

#[test]
fn bearish_flip_inside_bearish_origin_lock_keeps_full_weight() {
    let config = StrategyConfig::default();
    let gate = CooldownGate::from_config(&config);
    let aggregator = SignalAggregator::from_config(&config).unwrap();
    let planner = AllocationPlanner::new(config.min_trade_threshold_usd);

    let bull = OscillatorIndicator::default()
        .evaluate_raw(&candles(&rally()))
        .unwrap()
        .signal;
    let bear = OscillatorIndicator::default()
        .evaluate_raw(&candles(&selloff()))
        .unwrap()
        .signal;

    let key = GateKey::new("BTCUSDC", Timeframe::M30);
    let observe = |raw: [SignalValue; 3], now| -> BTreeMap<Timeframe, SignalValue> {
        timeframes()
            .into_iter()
            .zip(raw)
            .map(|(tf, s)| {
                let out = gate.evaluate(&GateKey::new("BTCUSDC", tf), s, now).unwrap();
                (tf, out.effective)
            })
            .collect()
    };

    // Every timeframe reverses Bearish → Bullish at t0; the 30m lock lasts 15 minutes.
    observe([bear, bear, bear], t0() - Duration::hours(1));
    let signals = observe([bull, bull, bull], t0());
    let weight = aggregator.weight(&signals);
    assert_eq!(weight, 1.0);
    assert_eq!(gate.record(&key).unwrap().lock().unwrap().origin, SignalValue::Bearish);

    let snapshot = PortfolioSnapshot::new(10_000.0, 8_000.0, t0()).with_position("BTCUSDC", 2_000.0, 10.0);
    assert_eq!(planner.plan("BTCUSDC", weight, &snapshot, 0.2).unwrap().action, Action::None);

    // Three attempts to flip 30m back to Bearish, five minutes apart.
    for minutes in [5, 10, 15] {
        let now = t0() + Duration::minutes(minutes);
        let signals = observe([bear, bull, bull], now);
        assert_eq!(signals[&Timeframe::M30], SignalValue::Bullish);
        assert_eq!(aggregator.weight(&signals), 1.0);
        let lock = gate.record(&key).unwrap().lock().copied().unwrap();
        assert_eq!(lock.expiry, now + Duration::minutes(15));

        let plan = planner.plan("BTCUSDC", 1.0, &snapshot, 0.2).unwrap();
        assert_eq!(plan.action, Action::None);
    }
}

#[test]
fn transition_inside_lock_is_accepted_without_extension() {
    let gate = CooldownGate::from_config(&StrategyConfig::default());
    let key = GateKey::new("SOLUSDC", Timeframe::H1);
    gate.evaluate(&key, SignalValue::Bullish, t0()).unwrap();
    gate.evaluate(&key, SignalValue::Bearish, t0() + Duration::minutes(1)).unwrap();

    let out = gate
        .evaluate(&key, SignalValue::Transition, t0() + Duration::minutes(10))
        .unwrap();
    assert_eq!(out.effective, SignalValue::Transition);
    assert_eq!(out.transition, GateTransition::Progressed);
    let lock = gate.record(&key).unwrap().lock().copied().unwrap();
    assert_eq!(lock.expiry, t0() + Duration::minutes(31));

    // After expiry anything is accepted.
    let out = gate
        .evaluate(&key, SignalValue::Bullish, t0() + Duration::minutes(31))
        .unwrap();
    assert_eq!(out.effective, SignalValue::Bullish);
    assert_eq!(out.transition, GateTransition::Expired);
}

#[test]
fn short_series_counts_as_bearish() {
    let config = StrategyConfig::default();
    let aggregator = SignalAggregator::from_config(&config).unwrap();
    let osc = OscillatorIndicator::new(8);

    let short = candles(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0, 106.0]);
    let err = osc.evaluate_raw(&short).unwrap_err();
    assert_eq!(err, IndicatorError::InsufficientData { needed: 8, got: 7 });

    // The failing timeframe is simply absent from the vote.
    let bull = osc.evaluate_raw(&candles(&rally())).unwrap().signal;
    let signals = BTreeMap::from([(Timeframe::H1, bull), (Timeframe::H2, bull)]);
    assert!((aggregator.weight(&signals) - 0.8).abs() < 1e-12);
}

#[test]
fn capital_limited_buy() {
    let planner = AllocationPlanner::new(15.0);
    let snapshot = PortfolioSnapshot::new(1_000.0, 50.0, t0()).with_position("FETUSDC", 0.0, 1.2);
    let plan = planner.plan("FETUSDC", 1.0, &snapshot, 0.2).unwrap();
    assert_eq!(plan.target.diff_usd, 200.0);
    assert_eq!(
        plan.action,
        Action::Buy {
            amount_usd: 50.0,
            capital_limited: true
        }
    );
}

#[test]
fn heikin_ashi_first_open_is_mid_body() {
    let raw = candles(&rally());
    let ha = HeikinAshiTransformer.transform(&raw).unwrap();
    assert_eq!(ha[0].open, (raw[0].open + raw[0].close) / 2.0);
    assert_eq!(ha.len(), raw.len());
}
