//! End-to-end engine tests: exits, entries, the re-entry gate, sampling and accounting.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use swinglab_core::data::PriceSeries;
use swinglab_core::domain::{Bar, CloseReason, PositionSide};
use swinglab_core::engine::{run_backtest, Backtest, EngineConfig};
use swinglab_core::indicators::IndicatorValues;
use swinglab_core::scenario::{
    ConfigError, DirectionMode, ExecutionParams, MacdParams, PositionSizing, ScenarioParams,
    SignalRule,
};
use swinglab_core::signals::SignalAnnotation;
use swinglab_core::EngineError;

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn bars(closes: &[f64], step: Duration) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar {
            timestamp: start() + step * i as i32,
            open: c,
            high: c * 1.005,
            low: c * 0.995,
            close: c,
            volume: 1_000.0,
        })
        .collect()
}

fn daily(closes: &[f64]) -> PriceSeries {
    PriceSeries::new(bars(closes, Duration::days(1))).unwrap()
}

fn params(direction_mode: DirectionMode, sizing: PositionSizing) -> ScenarioParams {
    ScenarioParams {
        signal_rule: SignalRule::MacdCross(MacdParams::default()),
        stop_loss_pct: 0.05,
        direction_mode,
        sizing,
        execution: ExecutionParams::default(),
    }
}

/// 40 flat bars, a convex rally, then an accelerating decline.
/// MACD(12, 26, 9) crosses up once (bar 40) and down once (bar 76).
fn two_crossover_closes() -> Vec<f64> {
    let mut closes = vec![100.0; 40];
    closes.extend((1..=30).map(|i| 100.0 + 0.02 * (i * i) as f64));
    let peak = 118.0;
    closes.extend((1..=30).map(|i| peak - 0.03 * (i * i) as f64));
    closes
}

/// Levels-only annotation for driving the loop directly.
fn levels(long_bias: &[bool], short_bias: &[bool]) -> SignalAnnotation {
    let valid = vec![true; long_bias.len()];
    SignalAnnotation::from_levels(
        long_bias.to_vec(),
        short_bias.to_vec(),
        &valid,
        IndicatorValues::new(),
    )
}

fn bools(s: &str) -> Vec<bool> {
    s.chars().map(|c| c == '1').collect()
}

#[test]
fn two_crossovers_yield_one_long_trade() {
    let closes = two_crossover_closes();
    assert_eq!(closes.len(), 100);
    let series = daily(&closes);
    let p = params(DirectionMode::Long, PositionSizing::BalanceFraction(0.5));

    let result = run_backtest(&series, &p, EngineConfig::default()).unwrap();

    assert_eq!(result.bar_count, 100);
    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.side, PositionSide::Long);
    assert_eq!(trade.entry_time, start() + Duration::days(40));
    assert_eq!(trade.exit_time, start() + Duration::days(76));
    assert_eq!(trade.entry_price, closes[40]);
    assert_eq!(trade.exit_price, closes[76]);
    assert_eq!(trade.close_reason, CloseReason::OpposingCrossover);
    assert_eq!(trade.initial_margin, 500.0);

    // margin 500, open fee 0.1, notional 499.9, fees at 2 / 6 bps
    assert!((trade.net_pnl - 82.067_536_410_717_88).abs() < 1e-6);
    assert!((result.final_balance - (1000.0 + trade.net_pnl)).abs() < 1e-9);
    assert!(result.open_position.is_none());
    assert!((result.final_equity - result.final_balance).abs() < 1e-9);
}

#[test]
fn open_position_is_not_force_closed() {
    let series = daily(&two_crossover_closes());
    let p = params(DirectionMode::Both, PositionSizing::BalanceFraction(0.5));

    let result = run_backtest(&series, &p, EngineConfig::default()).unwrap();

    // the down-cross closes the long; the short it signals is not opened on the same bar
    assert_eq!(result.trades.len(), 1);
    assert!(result.open_position.is_none());

    // with the short crossover as the only signal, the short is taken and held to the end
    let annotation = levels(
        &vec![false; series.len()],
        &(0..series.len()).map(|i| i >= 76).collect::<Vec<_>>(),
    );
    let bt = Backtest::from_annotation(&series, &p, annotation, EngineConfig::default()).unwrap();
    let result = bt.run(&p.execution).unwrap();
    assert!(result.trades.is_empty());
    let open = result.open_position.expect("short should still be open");
    assert_eq!(open.side, PositionSide::Short);
    assert_eq!(open.entry_time, start() + Duration::days(76));
    assert!((result.final_balance - 500.0).abs() < 1e-9);
    // equity still includes the open exposure
    assert!(result.final_equity > 900.0);
}

#[test]
fn stop_loss_fills_at_stop_price() {
    let mut b = bars(&[100.0; 6], Duration::days(1));
    b[3].low = 90.0;
    let series = PriceSeries::new(b).unwrap();
    let p = params(DirectionMode::Both, PositionSizing::BalanceFraction(1.0));
    let annotation = levels(&bools("011111"), &bools("000000"));

    let result = Backtest::from_annotation(&series, &p, annotation, EngineConfig::default())
        .unwrap()
        .run(&p.execution)
        .unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.close_reason, CloseReason::StopLoss);
    assert_eq!(trade.exit_time, start() + Duration::days(3));
    assert_eq!(trade.exit_price, trade.sl_price);
    assert!((trade.exit_price - 95.0).abs() < 1e-12);
    assert_ne!(trade.exit_price, 100.0);
    assert!(trade.net_pnl < 0.0);
}

#[test]
fn short_stop_triggers_on_high() {
    let mut b = bars(&[100.0; 5], Duration::days(1));
    b[2].high = 106.0;
    let series = PriceSeries::new(b).unwrap();
    let p = params(DirectionMode::Short, PositionSizing::FixedAmount(100.0));
    let annotation = levels(&bools("00000"), &bools("01111"));

    let result = Backtest::from_annotation(&series, &p, annotation, EngineConfig::default())
        .unwrap()
        .run(&p.execution)
        .unwrap();

    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].side, PositionSide::Short);
    assert_eq!(result.trades[0].close_reason, CloseReason::StopLoss);
    assert!((result.trades[0].exit_price - 105.0).abs() < 1e-12);
}

#[test]
fn entries_suppressed_after_stop_until_bias_returns() {
    // long opens on bar 1, stops on bar 2, short crossover on bar 4 is ignored,
    // MACD recrosses up on bar 6 and the long entry there is honored
    let mut b = bars(&[100.0; 8], Duration::days(1));
    b[2].low = 90.0;
    let series = PriceSeries::new(b).unwrap();
    let p = params(DirectionMode::Both, PositionSizing::BalanceFraction(0.5));
    let annotation = levels(&bools("01100011"), &bools("00001100"));
    assert!(annotation.short_entry[4]);

    let result = Backtest::from_annotation(&series, &p, annotation, EngineConfig::default())
        .unwrap()
        .run(&p.execution)
        .unwrap();

    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].close_reason, CloseReason::StopLoss);
    let open = result.open_position.expect("long re-entered on the recross");
    assert_eq!(open.side, PositionSide::Long);
    assert_eq!(open.entry_time, start() + Duration::days(6));
}

#[test]
fn no_reentry_while_original_bias_persists() {
    // bias never drops, so no fresh crossover ever fires after the stop
    let mut b = bars(&[100.0; 8], Duration::days(1));
    b[2].low = 90.0;
    let series = PriceSeries::new(b).unwrap();
    let p = params(DirectionMode::Long, PositionSizing::BalanceFraction(0.5));
    let annotation = levels(&bools("01111111"), &bools("00000000"));

    let result = Backtest::from_annotation(&series, &p, annotation, EngineConfig::default())
        .unwrap()
        .run(&p.execution)
        .unwrap();

    assert_eq!(result.trades.len(), 1);
    assert!(result.open_position.is_none());
    assert!((result.final_balance - (1000.0 + result.trades[0].net_pnl)).abs() < 1e-9);
}

#[test]
fn long_entry_on_bar_after_long_stop_is_honored() {
    // bias dips on the stop bar and crosses back up on the next one; the gate
    // reopens before entries are checked, so that crossover opens a new long
    let mut b = bars(&[100.0; 6], Duration::days(1));
    b[2].low = 90.0;
    let series = PriceSeries::new(b).unwrap();
    let p = params(DirectionMode::Long, PositionSizing::BalanceFraction(0.5));
    let annotation = levels(&bools("010111"), &bools("000000"));
    assert!(annotation.long_entry[3]);

    let result = Backtest::from_annotation(&series, &p, annotation, EngineConfig::default())
        .unwrap()
        .run(&p.execution)
        .unwrap();

    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].close_reason, CloseReason::StopLoss);
    assert_eq!(result.trades[0].exit_time, start() + Duration::days(2));
    let open = result.open_position.expect("long re-entered on the next bar");
    assert_eq!(open.side, PositionSide::Long);
    assert_eq!(open.entry_time, start() + Duration::days(3));
}

#[test]
fn full_balance_compounding_at_high_leverage_keeps_books_balanced() {
    // 40 cycles of a +30% leg and a -4% leg, each taken with the whole balance at 10x
    let cycle = [100.0, 100.0, 130.0, 100.0, 100.0, 96.0];
    let closes: Vec<f64> = cycle.iter().copied().cycle().take(cycle.len() * 40).collect();
    let series = daily(&closes);
    let long_bias: Vec<bool> = bools("010010").into_iter().cycle().take(closes.len()).collect();
    let short_bias: Vec<bool> = bools("001001").into_iter().cycle().take(closes.len()).collect();
    let mut p = params(DirectionMode::Long, PositionSizing::BalanceFraction(1.0));
    p.execution.leverage = 10.0;

    let result = Backtest::from_annotation(
        &series,
        &p,
        levels(&long_bias, &short_bias),
        EngineConfig::default(),
    )
    .unwrap()
    .run(&p.execution)
    .unwrap();

    assert_eq!(result.trades.len(), 80);
    assert!(result.trades.iter().all(|t| t.close_reason == CloseReason::OpposingCrossover));
    assert!(result.open_position.is_none());
    assert!(result.final_balance > 1e15);
    let expected = 1000.0 + result.total_net_pnl();
    assert!((result.final_balance - expected).abs() <= 1e-9 * result.final_balance);
}

#[test]
fn short_stop_blocks_long_entry_until_short_bias_returns() {
    let mut b = bars(&[100.0; 8], Duration::days(1));
    b[2].high = 110.0;
    let series = PriceSeries::new(b).unwrap();
    let p = params(DirectionMode::Both, PositionSizing::BalanceFraction(0.5));
    let annotation = levels(&bools("00001100"), &bools("01100011"));

    let result = Backtest::from_annotation(&series, &p, annotation, EngineConfig::default())
        .unwrap()
        .run(&p.execution)
        .unwrap();

    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].side, PositionSide::Short);
    let open = result.open_position.expect("short re-entered");
    assert_eq!(open.side, PositionSide::Short);
    assert_eq!(open.entry_time, start() + Duration::days(6));
}

#[test]
fn opposing_crossover_closes_at_close_without_same_bar_entry() {
    let series = daily(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
    let p = params(DirectionMode::Both, PositionSizing::BalanceFraction(0.5));
    let annotation = levels(&bools("011000"), &bools("000111"));

    let result = Backtest::from_annotation(&series, &p, annotation, EngineConfig::default())
        .unwrap()
        .run(&p.execution)
        .unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.close_reason, CloseReason::OpposingCrossover);
    assert_eq!(trade.entry_price, 101.0);
    assert_eq!(trade.exit_price, 103.0);
    assert!(result.open_position.is_none());
}

#[test]
fn direction_mode_gates_entries_only() {
    let series = daily(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
    let annotation = levels(&bools("011000"), &bools("000111"));

    let long_only = params(DirectionMode::Long, PositionSizing::BalanceFraction(0.5));
    let result =
        Backtest::from_annotation(&series, &long_only, annotation.clone(), EngineConfig::default())
            .unwrap()
            .run(&long_only.execution)
            .unwrap();
    // the short signal still closes the long
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].close_reason, CloseReason::OpposingCrossover);

    let short_only = params(DirectionMode::Short, PositionSizing::BalanceFraction(0.5));
    let result =
        Backtest::from_annotation(&series, &short_only, annotation, EngineConfig::default())
            .unwrap()
            .run(&short_only.execution)
            .unwrap();
    assert!(result.trades.is_empty());
    let open = result.open_position.unwrap();
    assert_eq!(open.side, PositionSide::Short);
    assert_eq!(open.entry_price, 103.0);
}

#[test]
fn unfundable_entry_is_skipped() {
    let series = daily(&[100.0; 5]);
    let p = params(DirectionMode::Both, PositionSizing::FixedAmount(5_000.0));
    let annotation = levels(&bools("01111"), &bools("00000"));

    let result = Backtest::from_annotation(&series, &p, annotation, EngineConfig::default())
        .unwrap()
        .run(&p.execution)
        .unwrap();

    assert!(result.trades.is_empty());
    assert!(result.open_position.is_none());
    assert_eq!(result.final_balance, 1000.0);
    assert!(result.equity_curve.iter().all(|s| s.equity == 1000.0));
}

#[test]
fn replay_is_deterministic() {
    let series = daily(&two_crossover_closes());
    let p = params(DirectionMode::Both, PositionSizing::BalanceFraction(0.3));
    let a = run_backtest(&series, &p, EngineConfig::default()).unwrap();
    let b = run_backtest(&series, &p, EngineConfig::default()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn hourly_bars_sample_every_six_hours() {
    let closes: Vec<f64> = (0..48).map(|i| 100.0 + (i % 5) as f64 * 0.1).collect();
    let series = PriceSeries::new(bars(&closes, Duration::hours(1))).unwrap();
    let p = params(DirectionMode::Both, PositionSizing::BalanceFraction(0.5));

    let result = run_backtest(&series, &p, EngineConfig::default()).unwrap();

    assert_eq!(result.equity_curve.len(), 8);
    for pair in result.equity_curve.windows(2) {
        assert_eq!(pair[1].time - pair[0].time, Duration::hours(6));
    }
    assert_eq!(result.equity_curve[0].time, start());
}

#[test]
fn cadence_is_configurable() {
    let closes = vec![100.0; 10];
    let series = PriceSeries::new(bars(&closes, Duration::hours(4))).unwrap();
    let p = params(DirectionMode::Both, PositionSizing::BalanceFraction(0.5));

    let result = run_backtest(&series, &p, EngineConfig::with_cadence(Duration::hours(8))).unwrap();
    assert_eq!(result.equity_curve.len(), 5);

    let err = run_backtest(&series, &p, EngineConfig::with_cadence(Duration::zero())).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Config(ConfigError::InvalidParameter { name: "equity_cadence", .. })
    ));
}

#[test]
fn invalid_parameters_fail_before_the_loop() {
    let series = daily(&[100.0; 5]);
    let mut p = params(DirectionMode::Both, PositionSizing::BalanceFraction(0.5));
    p.sizing = PositionSizing::FixedAmount(-1.0);
    assert!(matches!(
        run_backtest(&series, &p, EngineConfig::default()),
        Err(EngineError::Config(_))
    ));

    let p = params(DirectionMode::Both, PositionSizing::BalanceFraction(0.5));
    let short = levels(&bools("010"), &bools("000"));
    assert_eq!(
        Backtest::from_annotation(&series, &p, short, EngineConfig::default()).unwrap_err(),
        EngineError::AnnotationLength {
            expected: 5,
            actual: 3
        }
    );

    let bad_exec = ExecutionParams {
        leverage: 0.0,
        ..ExecutionParams::default()
    };
    let bt = Backtest::new(&series, &p, EngineConfig::default()).unwrap();
    assert!(matches!(bt.run(&bad_exec), Err(EngineError::Config(_))));
}

#[test]
fn leverage_scales_pnl() {
    let series = daily(&[100.0, 100.0, 110.0, 110.0]);
    let annotation = levels(&bools("0100"), &bools("0001"));
    let mut p = params(DirectionMode::Long, PositionSizing::FixedAmount(100.0));
    p.execution.open_fee_rate = 0.0;
    p.execution.close_fee_rate = 0.0;
    p.execution.leverage = 3.0;

    let result = Backtest::from_annotation(&series, &p, annotation, EngineConfig::default())
        .unwrap()
        .run(&p.execution)
        .unwrap();

    // notional 300, +10%
    assert!((result.trades[0].net_pnl - 30.0).abs() < 1e-9);
    assert!((result.final_balance - 1030.0).abs() < 1e-9);
}
