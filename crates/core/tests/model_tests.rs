// ═══════════════════════════════════════════════════════════════════
// Model Tests: Timeframe, PricePoint, TickerItem, config, chart helpers
// ═══════════════════════════════════════════════════════════════════

use chrono::{DateTime, Duration, TimeZone, Utc};

use watchfolio_core::errors::CoreError;
use watchfolio_core::models::chart::{return_range, AlignedPoint, ChartView};
use watchfolio_core::models::fetch::{
    FetchOptions, FetchStatus, FetchStatusSnapshot, StartOutcome, StartRejection,
};
use watchfolio_core::models::price::{sort_and_dedup, PricePoint};
use watchfolio_core::models::settings::{CoreConfig, SchedulerConfig};
use watchfolio_core::models::ticker::{TickerItem, TickerType, WatchlistKey};
use watchfolio_core::models::timeframe::{HistoryInterval, SliceAnchor, Timeframe};

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

// ═══════════════════════════════════════════════════════════════════
//  Timeframe
// ═══════════════════════════════════════════════════════════════════

mod timeframe {
    use super::*;

    #[test]
    fn parses_known_tokens() {
        assert_eq!(Timeframe::parse("D"), Timeframe::Day);
        assert_eq!(Timeframe::parse("W"), Timeframe::Week);
        assert_eq!(Timeframe::parse("M"), Timeframe::Month);
        assert_eq!(Timeframe::parse("Y"), Timeframe::Year);
        assert_eq!(Timeframe::parse("YTD"), Timeframe::YearToDate);
        assert_eq!(Timeframe::parse("MAX"), Timeframe::Max);
    }

    #[test]
    fn unknown_token_defaults_to_max() {
        assert_eq!(Timeframe::parse("5Y"), Timeframe::Max);
        assert_eq!(Timeframe::parse(""), Timeframe::Max);
    }

    #[test]
    fn tokens_are_case_sensitive() {
        assert_eq!(Timeframe::parse("d"), Timeframe::Max);
        assert_eq!(Timeframe::parse("ytd"), Timeframe::Max);
    }

    #[test]
    fn from_str_never_fails() {
        let tf: Timeframe = "W".parse().unwrap();
        assert_eq!(tf, Timeframe::Week);
        let tf: Timeframe = "garbage".parse().unwrap();
        assert_eq!(tf, Timeframe::Max);
    }

    #[test]
    fn token_round_trips_for_all() {
        for tf in Timeframe::all() {
            assert_eq!(Timeframe::parse(tf.token()), tf);
            assert_eq!(tf.to_string(), tf.token());
        }
    }

    #[test]
    fn serde_uses_tokens_and_tolerates_unknown() {
        assert_eq!(serde_json::to_string(&Timeframe::YearToDate).unwrap(), "\"YTD\"");
        let tf: Timeframe = serde_json::from_str("\"M\"").unwrap();
        assert_eq!(tf, Timeframe::Month);
        let tf: Timeframe = serde_json::from_str("\"1H\"").unwrap();
        assert_eq!(tf, Timeframe::Max);
    }

    #[test]
    fn lookback_windows() {
        let now = at(2024, 3, 15, 12, 0);
        assert_eq!(Timeframe::Day.lookback_start(now), Some(now - Duration::days(1)));
        assert_eq!(Timeframe::Week.lookback_start(now), Some(now - Duration::days(7)));
        assert_eq!(Timeframe::Month.lookback_start(now), Some(at(2024, 2, 15, 12, 0)));
        assert_eq!(Timeframe::Year.lookback_start(now), Some(at(2023, 3, 15, 12, 0)));
        assert_eq!(Timeframe::YearToDate.lookback_start(now), Some(at(2024, 1, 1, 0, 0)));
        assert_eq!(Timeframe::Max.lookback_start(now), None);
    }

    #[test]
    fn history_intervals() {
        assert_eq!(Timeframe::Day.history_interval(), HistoryInterval::FiveMinutes);
        assert_eq!(Timeframe::Week.history_interval(), HistoryInterval::ThirtyMinutes);
        assert_eq!(Timeframe::Month.history_interval(), HistoryInterval::OneHour);
        assert_eq!(Timeframe::Max.history_interval(), HistoryInterval::OneDay);
        assert!(HistoryInterval::OneHour.is_intraday());
        assert!(!HistoryInterval::OneDay.is_intraday());
        assert_eq!(HistoryInterval::ThirtyMinutes.as_yahoo_str(), "30m");
    }

    #[test]
    fn history_start_uses_buy_date_only_for_max() {
        let now = at(2024, 3, 15, 12, 0);
        let bought = at(2020, 1, 2, 0, 0);
        assert_eq!(Timeframe::Max.history_start(now, bought), bought);
        assert_eq!(Timeframe::Week.history_start(now, bought), now - Duration::days(7));
    }
}

// ═══════════════════════════════════════════════════════════════════
//  SliceAnchor
// ═══════════════════════════════════════════════════════════════════

mod slice_anchor {
    use super::*;

    #[test]
    fn lookback_ignores_buy_date() {
        let now = at(2024, 3, 15, 12, 0);
        let bought = at(2024, 3, 14, 20, 0);
        assert_eq!(
            SliceAnchor::Lookback.resolve(Timeframe::Week, now, bought),
            Some(now - Duration::days(7))
        );
    }

    #[test]
    fn later_of_picks_recent_buy_date() {
        let now = at(2024, 3, 15, 12, 0);
        let bought = at(2024, 3, 1, 0, 0);
        assert_eq!(SliceAnchor::LaterOf.resolve(Timeframe::Year, now, bought), Some(bought));
    }

    #[test]
    fn later_of_picks_lookback_for_old_position() {
        let now = at(2024, 3, 15, 12, 0);
        let bought = at(2019, 3, 1, 0, 0);
        assert_eq!(
            SliceAnchor::LaterOf.resolve(Timeframe::Month, now, bought),
            Some(at(2024, 2, 15, 12, 0))
        );
    }

    #[test]
    fn later_of_with_max_is_buy_date() {
        let now = at(2024, 3, 15, 12, 0);
        let bought = at(2019, 3, 1, 0, 0);
        assert_eq!(SliceAnchor::LaterOf.resolve(Timeframe::Max, now, bought), Some(bought));
    }

    #[test]
    fn lookback_with_max_is_unbounded() {
        let now = at(2024, 3, 15, 12, 0);
        assert_eq!(SliceAnchor::Lookback.resolve(Timeframe::Max, now, now), None);
    }
}

// ═══════════════════════════════════════════════════════════════════
//  PricePoint
// ═══════════════════════════════════════════════════════════════════

mod price_point {
    use super::*;

    #[test]
    fn usable_only_when_finite_and_positive() {
        let t = at(2024, 1, 2, 0, 0);
        assert!(PricePoint::new(t, 1.0).is_usable());
        assert!(!PricePoint::new(t, 0.0).is_usable());
        assert!(!PricePoint::new(t, -3.0).is_usable());
        assert!(!PricePoint::new(t, f64::NAN).is_usable());
        assert!(!PricePoint::new(t, f64::INFINITY).is_usable());
    }

    #[test]
    fn with_bar_sets_ohlcv_fields() {
        let p = PricePoint::new(at(2024, 1, 2, 0, 0), 10.0).with_bar(11.0, 9.0, 1_000);
        assert_eq!(p.high, Some(11.0));
        assert_eq!(p.low, Some(9.0));
        assert_eq!(p.volume, Some(1_000));
    }

    #[test]
    fn sort_and_dedup_orders_and_keeps_latest_arrival() {
        let t0 = at(2024, 1, 2, 0, 0);
        let t1 = at(2024, 1, 3, 0, 0);
        let mut points = vec![
            PricePoint::new(t1, 2.0),
            PricePoint::new(t0, 1.0),
            PricePoint::new(t1, 3.0),
        ];
        sort_and_dedup(&mut points);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].timestamp, t0);
        assert_eq!(points[1].price, 3.0);
    }

    #[test]
    fn optional_bar_fields_are_skipped_in_json() {
        let p = PricePoint::new(at(2024, 1, 2, 0, 0), 10.0);
        let json = serde_json::to_string(&p).unwrap();
        assert!(!json.contains("high"));
        let back: PricePoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}

// ═══════════════════════════════════════════════════════════════════
//  TickerItem
// ═══════════════════════════════════════════════════════════════════

mod ticker_item {
    use super::*;

    #[test]
    fn new_uppercases_and_trims_symbol() {
        let item = TickerItem::new("  aapl ", 100.0, at(2024, 1, 2, 0, 0));
        assert_eq!(item.symbol, "AAPL");
        assert!(item.is_real());
        assert!(item.historical_data.is_empty());
    }

    #[test]
    fn mock_is_not_real() {
        let item = TickerItem::mock("SYN", 10.0, at(2024, 1, 2, 0, 0));
        assert_eq!(item.ticker_type, TickerType::Mock);
        assert!(!item.is_real());
    }

    #[test]
    fn buy_price_validity() {
        let t = at(2024, 1, 2, 0, 0);
        assert!(TickerItem::new("A", 1.0, t).has_valid_buy_price());
        assert!(!TickerItem::new("A", 0.0, t).has_valid_buy_price());
        assert!(!TickerItem::new("A", f64::NAN, t).has_valid_buy_price());
    }

    #[test]
    fn validate_symbol_rejects_empty_and_whitespace() {
        let t = at(2024, 1, 2, 0, 0);
        assert!(TickerItem::new("MSFT", 1.0, t).validate_symbol().is_ok());
        assert!(matches!(
            TickerItem::new("   ", 1.0, t).validate_symbol(),
            Err(CoreError::ValidationError(_))
        ));
        assert!(matches!(
            TickerItem::new("BRK B", 1.0, t).validate_symbol(),
            Err(CoreError::ValidationError(_))
        ));
    }

    #[test]
    fn apply_quote_updates_price_and_history() {
        let t0 = at(2024, 1, 2, 0, 0);
        let t1 = at(2024, 1, 3, 0, 0);
        let mut item = TickerItem::new("AAPL", 100.0, t0).with_history(vec![PricePoint::new(t0, 100.0)]);
        item.apply_quote(PricePoint::new(t1, 120.0));
        assert_eq!(item.current_price, Some(120.0));
        assert_eq!(item.last_updated, Some(t1));
        assert_eq!(item.historical_data.len(), 2);
        assert_eq!(item.historical_data.last().unwrap().price, 120.0);
    }

    #[test]
    fn merge_history_replaces_duplicate_timestamps() {
        let t0 = at(2024, 1, 2, 0, 0);
        let t1 = at(2024, 1, 3, 0, 0);
        let mut item = TickerItem::new("AAPL", 100.0, t0)
            .with_history(vec![PricePoint::new(t1, 105.0), PricePoint::new(t0, 100.0)]);
        item.merge_history(vec![PricePoint::new(t1, 107.0)]);
        assert_eq!(item.historical_data.len(), 2);
        assert_eq!(item.historical_data[0].timestamp, t0);
        assert_eq!(item.historical_data[1].price, 107.0);
    }

    #[test]
    fn current_return_percent() {
        let t = at(2024, 1, 2, 0, 0);
        let mut item = TickerItem::new("AAPL", 100.0, t);
        assert_eq!(item.current_return_percent(), None);
        item.current_price = Some(125.0);
        assert_eq!(item.current_return_percent(), Some(25.0));
        item.buy_price = 0.0;
        assert_eq!(item.current_return_percent(), None);
    }

    #[test]
    fn serde_uses_type_field_and_defaults() {
        let json = r#"{
            "symbol": "NVDA",
            "buy_price": 450.0,
            "buy_date": "2024-01-02T00:00:00Z"
        }"#;
        let item: TickerItem = serde_json::from_str(json).unwrap();
        assert!(item.is_real());
        assert!(item.historical_data.is_empty());
        assert_eq!(item.current_price, None);

        let mock = TickerItem::mock("SYN", 1.0, at(2024, 1, 2, 0, 0));
        let json = serde_json::to_string(&mock).unwrap();
        assert!(json.contains("\"type\":\"mock\""));
    }

    #[test]
    fn watchlist_key_is_transparent() {
        let key = WatchlistKey::from("tech-stocks");
        assert_eq!(key.as_str(), "tech-stocks");
        assert_eq!(key.to_string(), "tech-stocks");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"tech-stocks\"");
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Configuration
// ═══════════════════════════════════════════════════════════════════

mod config {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.batch_size, 5);
        assert_eq!(config.scheduler.stagger_interval_secs, 15);
        assert_eq!(config.scheduler.refresh_interval_secs, Some(300));
        assert_eq!(config.rate_budget.daily_limit, 500);
        assert_eq!(config.aligner.full_cap, 150);
        assert_eq!(config.aligner.mini_cap, 40);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config = CoreConfig::from_json(r#"{"scheduler": {"batch_size": 2}}"#).unwrap();
        assert_eq!(config.scheduler.batch_size, 2);
        assert_eq!(config.scheduler.stagger_interval_secs, 15);
        assert_eq!(config.market_hours.open, "09:30");
    }

    #[test]
    fn anchor_table_can_be_overridden() {
        let config =
            CoreConfig::from_json(r#"{"aligner": {"anchors": {"D": "buy_date", "W": "lookback", "M": "lookback", "Y": "lookback", "YTD": "lookback", "MAX": "later_of"}}}"#)
                .unwrap();
        assert_eq!(*config.aligner.anchors.get(Timeframe::Day), SliceAnchor::BuyDate);
        assert_eq!(*config.aligner.anchors.get(Timeframe::Max), SliceAnchor::LaterOf);
    }

    #[test]
    fn null_refresh_interval_means_single_pass() {
        let config =
            CoreConfig::from_json(r#"{"scheduler": {"refresh_interval_secs": null}}"#).unwrap();
        assert_eq!(config.scheduler.refresh_interval(), None);
    }

    #[test]
    fn rejects_zero_batch_size() {
        let config = SchedulerConfig {
            batch_size: 0,
            ..SchedulerConfig::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn rejects_zero_refresh_interval() {
        let result = CoreConfig::from_json(r#"{"scheduler": {"refresh_interval_secs": 0}}"#);
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn rejects_unknown_time_zone() {
        let result = CoreConfig::from_json(r#"{"rate_budget": {"timezone": "Mars/Olympus"}}"#);
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn rejects_bad_clock_string() {
        let result = CoreConfig::from_json(r#"{"market_hours": {"open": "9.30am"}}"#);
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn accepts_clock_with_seconds() {
        let config = CoreConfig::from_json(r#"{"rate_budget": {"reset_time": "04:00:00"}}"#).unwrap();
        assert_eq!(config.rate_budget.reset_clock().unwrap().to_string(), "04:00:00");
    }

    #[test]
    fn rejects_tiny_caps() {
        let result = CoreConfig::from_json(r#"{"aligner": {"mini_cap": 1}}"#);
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn malformed_json_is_deserialization_error() {
        assert!(matches!(
            CoreConfig::from_json("{"),
            Err(CoreError::Deserialization(_))
        ));
    }

    #[test]
    fn to_json_round_trips() {
        let config = CoreConfig::default();
        let json = config.to_json().unwrap();
        let back = CoreConfig::from_json(&json).unwrap();
        assert_eq!(back.scheduler, config.scheduler);
        assert_eq!(back.aligner, config.aligner);
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Fetch models & chart helpers
// ═══════════════════════════════════════════════════════════════════

mod fetch_models {
    use super::*;

    #[test]
    fn start_outcome_constructors() {
        let ok = StartOutcome::started(None);
        assert!(ok.success);
        assert!(ok.rejection.is_none());

        let closed = StartOutcome::rejected(StartRejection::MarketClosed, "closed");
        assert!(!closed.success);
        assert!(closed.is_market_closed());
        assert_eq!(closed.message.as_deref(), Some("closed"));
    }

    #[test]
    fn start_outcome_json_omits_empty_message() {
        let json = serde_json::to_string(&StartOutcome::started(None)).unwrap();
        assert_eq!(json, r#"{"success":true}"#);
    }

    #[test]
    fn options_constructors() {
        let manual = FetchOptions::manual(Timeframe::Day);
        assert!(manual.manual);
        assert!(!manual.bypass_market_closed);
        let auto = FetchOptions::automatic(Timeframe::Max).bypassing_market_hours();
        assert!(!auto.manual);
        assert!(auto.bypass_market_closed);
    }

    #[test]
    fn default_snapshot_is_idle() {
        let snapshot = FetchStatusSnapshot::default();
        assert_eq!(snapshot.status, FetchStatus::Idle);
        assert!(snapshot.last_progress.is_none());
        assert_eq!(FetchStatus::Paused.to_string(), "Paused");
    }

    #[test]
    fn chart_view_from_flag() {
        assert_eq!(ChartView::from_mini(true), ChartView::Mini);
        assert_eq!(ChartView::from_mini(false), ChartView::Full);
    }

    fn point(ret: f64, x: usize) -> AlignedPoint {
        AlignedPoint {
            timestamp_value: x as i64 * 1000,
            return_percent: ret,
            x_index: x,
        }
    }

    #[test]
    fn return_range_of_empty_series() {
        assert_eq!(return_range(&[]), None);
    }

    #[test]
    fn return_range_widens_flat_series() {
        let series = vec![point(2.0, 0), point(2.0, 1)];
        assert_eq!(return_range(&series), Some((1.0, 3.0)));
    }

    #[test]
    fn return_range_spans_min_to_max() {
        let series = vec![point(-4.0, 0), point(6.5, 1), point(1.0, 2)];
        assert_eq!(return_range(&series), Some((-4.0, 6.5)));
    }
}
