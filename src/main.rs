use std::env;
use std::fs;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: chordgrid <input.grid> [output.yaml]");
        eprintln!("       chordgrid --analyze <input.grid> [output.yaml]");
        process::exit(1);
    }

    let mut analyze_beams = false;
    let mut input_path = &args[1];
    let mut output_path: Option<&String> = args.get(2);

    // Parse flags
    if args[1] == "--analyze" {
        analyze_beams = true;
        if args.len() < 3 {
            eprintln!("Usage: chordgrid --analyze <input.grid> [output.yaml]");
            process::exit(1);
        }
        input_path = &args[2];
        output_path = args.get(3);
    }

    // Read input file
    let source = match fs::read_to_string(input_path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", input_path, e);
            process::exit(1);
        }
    };

    // Compile
    let yaml = if analyze_beams {
        match chordgrid::analyze(&source) {
            Ok((grid, analyzed)) => {
                report_diagnostics(&grid);
                serde_yaml::to_string(&analyzed)
            }
            Err(e) => {
                eprintln!("Compilation error: {}", e);
                process::exit(1);
            }
        }
    } else {
        match chordgrid::compile(&source) {
            Ok(grid) => {
                report_diagnostics(&grid);
                serde_yaml::to_string(&grid)
            }
            Err(e) => {
                eprintln!("Compilation error: {}", e);
                process::exit(1);
            }
        }
    };

    let yaml = match yaml {
        Ok(yaml) => yaml,
        Err(e) => {
            eprintln!("Serialization error: {}", e);
            process::exit(1);
        }
    };

    // Output
    match output_path {
        Some(path) => {
            if let Err(e) = fs::write(path, &yaml) {
                eprintln!("Error writing to '{}': {}", path, e);
                process::exit(1);
            }
            eprintln!("Wrote grid to {}", path);
        }
        None => {
            println!("{}", yaml);
        }
    }
}

/// Per-measure problems are warnings, not failures: the grid still renders.
fn report_diagnostics(grid: &chordgrid::Grid) {
    for diagnostic in &grid.errors {
        eprintln!("Warning: {}", diagnostic);
    }
}
