use std::process::exit;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match qcc_drv::run(args) {
        Ok(code) => exit(code),
        Err(err) => {
            eprintln!("qcc: error: {:#}", err);
            exit(1);
        }
    }
}
