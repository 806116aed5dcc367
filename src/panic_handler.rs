use std::panic;

pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        // the log file may be the only trace when stderr is a pipe
        log::error!("Panic: {panic_info}");
        log::logger().flush();

        default_hook(panic_info);
    }));
}
