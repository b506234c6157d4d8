use clap::Parser;

fn main() {
    let args = picroll::Args::parse();

    if let Err(err) = picroll::run(args) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}
