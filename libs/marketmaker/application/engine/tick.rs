//! Tick-grid rounding.
//!
//! Buys round down and sells round up so a rounded price never crosses
//! the intended side of the grid. A small epsilon absorbs float noise so
//! prices already on the grid stay put.

const GRID_EPSILON: f64 = 1e-9;

/// Round down to the tick grid (buy prices).
pub fn round_down_to_tick(price: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return price;
    }
    let ticks = (price / tick + GRID_EPSILON).floor();
    ticks * tick
}

/// Round up to the tick grid (sell prices).
pub fn round_up_to_tick(price: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return price;
    }
    let ticks = (price / tick - GRID_EPSILON).ceil();
    ticks * tick
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn on_grid_prices_stay_put() {
        assert!(close(round_down_to_tick(0.50, 0.01), 0.50));
        assert!(close(round_up_to_tick(0.50, 0.01), 0.50));
        assert!(close(round_down_to_tick(0.505, 0.001), 0.505));
    }

    #[test]
    fn off_grid_rounds_toward_side() {
        assert!(close(round_down_to_tick(0.505, 0.01), 0.50));
        assert!(close(round_up_to_tick(0.505, 0.01), 0.51));
        assert!(close(round_down_to_tick(0.519, 0.01), 0.51));
    }

    #[test]
    fn take_profit_product_rounds_cleanly() {
        // 0.50 * 1.1 carries float noise; ceil must still land on 0.55
        let tp = 0.50 * 1.10;
        assert!(close(round_up_to_tick(tp, 0.01), 0.55));
    }

    #[test]
    fn fine_grid() {
        assert!(close(round_down_to_tick(0.1234, 0.001), 0.123));
        assert!(close(round_up_to_tick(0.1234, 0.001), 0.124));
    }
}
