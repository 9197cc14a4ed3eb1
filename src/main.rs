fn main() -> Result<(), eframe::Error> {
    // Set up logging for development
    env_logger::init();

    firework_planner::run_app()
}
