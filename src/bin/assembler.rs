use std::env;
use std::path::Path;

use esetvm2_asm::assembler;
use esetvm2_asm::logging::error;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} <input_path> <output_path>", args[0]);
        std::process::exit(1);
    }

    let input_path = Path::new(&args[1]);
    let output_path = Path::new(&args[2]);

    if let Err(err) = assembler::assemble_file(input_path, output_path) {
        match err {
            assembler::Error::Parse(_) => {
                println!("{err}");
                std::process::exit(2);
            }
            assembler::Error::Assemble(_) => {
                println!("{err}");
                std::process::exit(3);
            }
            assembler::Error::Io { .. } => {
                error(err.to_string());
                std::process::exit(4);
            }
        }
    }

    println!("All ok");
}
