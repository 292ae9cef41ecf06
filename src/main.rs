fn main() {
    if let Err(e) = cafe_order_lib::run() {
        eprintln!("cafe-order: {e:#}");
        std::process::exit(1);
    }
}
