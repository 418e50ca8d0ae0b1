use clap::Parser;
use colored::*;
use hazmpmc::pool::ThreadPool;
use hazmpmc::queue::MpmcQueue;
use rand::Rng;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the hazard-pointer MPMC queue demo.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose tracing output (equivalent to RUST_LOG=trace).
    #[arg(short, long)]
    verbose: bool,

    /// Run a stress test with many concurrent producers and consumers.
    #[arg(short, long)]
    stress_test: bool,

    /// Run a smaller verification test (faster than full stress test).
    #[arg(long)]
    quick_test: bool,

    /// Show a visual demonstration of the help-advance protocol.
    #[arg(long, default_value_t = true)]
    show_demo: bool,

    /// Skip the help-advance demonstration.
    #[arg(long)]
    no_show_demo: bool,

    /// Demonstrate the bundled thread pool running tasks off the queue.
    #[arg(long)]
    pool_demo: bool,

    /// Run diagnostics on the MpmcQueue and ThreadPool implementations.
    #[arg(long)]
    diagnose: bool,
}

fn main() {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("{}", "Hazard-Pointer MPMC Queue Demonstration".green().bold());
    println!("=========================================\n");

    if args.diagnose {
        println!("{}", "Running diagnostics...".yellow().bold());
        hazmpmc::diagnostics::diagnose();
        return;
    }

    let show_demo = args.show_demo && !args.no_show_demo;

    if show_demo {
        help_advance_demonstration();
    }

    if args.pool_demo {
        thread_pool_demo();
    }

    if args.stress_test {
        stress_test();
    } else if args.quick_test {
        quick_verification_test();
    } else if !show_demo && !args.pool_demo {
        basic_demo();
    }

    println!("\n{}", "Demonstration complete!".green().bold());
}

/// Demonstrates basic push/pop usage of the queue.
fn basic_demo() {
    println!("{}", "\nRunning basic demonstration...".yellow().bold());

    let queue = MpmcQueue::new(8);

    println!("Pushing values 1, 2, 3 onto the queue");
    queue.push(1);
    queue.push(2);
    queue.push(3);

    println!("Queue size: {}", queue.size());

    println!("\nPopping values from the queue:");
    while let Some(value) = queue.pop() {
        println!("Popped: {}", value);
    }

    println!("Queue is now empty: {}", queue.is_empty());
}

/// Demonstrates the help-advance protocol: a producer that stalls between
/// its successful `next`-CAS and its `tail`-CAS must be helped along by a
/// concurrent producer observing a non-null `tail.next` (SPEC_FULL.md §4.2.2,
/// scenario S6).
fn help_advance_demonstration() {
    println!(
        "{}",
        "\nDemonstrating the help-advance protocol...".yellow().bold()
    );

    let queue = Arc::new(MpmcQueue::new(8));
    queue.push(1);
    println!("Initial queue state: [1]");

    let queue_clone1 = Arc::clone(&queue);
    let queue_clone2 = Arc::clone(&queue);

    let handle1 = thread::spawn(move || {
        println!("{}", "Producer A: pushing 2".blue());
        queue_clone1.push(2);
    });

    thread::sleep(Duration::from_millis(20));

    let handle2 = thread::spawn(move || {
        println!(
            "{}",
            "Producer B: pushing 3 concurrently, may need to help-advance tail".magenta()
        );
        queue_clone2.push(3);
    });

    handle1.join().expect("producer A panicked");
    handle2.join().expect("producer B panicked");

    println!("\n{}", "Final queue contents:".green().bold());
    let mut drained = Vec::new();
    while let Some(v) = queue.pop() {
        drained.push(v);
    }
    println!("{:?}", drained);
    println!(
        "Every element reached the queue exactly once regardless of which producer's tail-CAS \
         lost the race."
    );
}

/// Demonstrates the bundled thread pool consuming the queue as a task
/// dispatch mechanism.
fn thread_pool_demo() {
    println!("{}", "\nRunning thread-pool demonstration...".yellow().bold());

    let pool = ThreadPool::new(4, 16);
    let completed = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    for i in 0..20 {
        let completed = Arc::clone(&completed);
        pool.execute(move || {
            println!("Worker running task {}", i);
            completed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
    }

    pool.wait_idle();
    println!(
        "Completed {} tasks",
        completed.load(std::sync::atomic::Ordering::SeqCst)
    );
}

/// Run a stress test with many concurrent producers and consumers.
fn stress_test() {
    println!(
        "{}",
        "\nRunning stress test with concurrent producers and consumers..."
            .yellow()
            .bold()
    );

    let queue = Arc::new(MpmcQueue::new(16));
    let num_threads = 4;
    let operations_per_thread = 2000;
    let test_timeout = Duration::from_secs(30);

    let mut handles = Vec::new();
    let start_time = Instant::now();

    println!(
        "Spawning {} producer threads with {} pushes each (timeout: {}s)",
        num_threads,
        operations_per_thread,
        test_timeout.as_secs()
    );

    for thread_id in 0..num_threads {
        let queue = Arc::clone(&queue);
        handles.push(thread::spawn(move || {
            let mut rng = rand::rng();
            let mut pushes = 0;
            for op in 0..operations_per_thread {
                if Instant::now().duration_since(start_time) > test_timeout {
                    println!("Thread {} timed out, returning early", thread_id);
                    return pushes;
                }
                queue.push(rng.random::<u32>());
                pushes += 1;
                if op % 500 == 0 {
                    println!("Thread {} pushed {} values", thread_id, op);
                }
            }
            pushes
        }));
    }

    let mut total_pushes = 0;
    for handle in handles {
        total_pushes += handle.join().expect("producer thread panicked");
    }

    let mut total_pops = 0;
    while queue.pop().is_some() {
        total_pops += 1;
    }

    let elapsed = Instant::now().duration_since(start_time);
    println!("\nStress test completed in {:.2}s!", elapsed.as_secs_f32());
    println!("Total pushes: {}", total_pushes);
    println!("Total pops: {}", total_pops);
    assert_eq!(total_pushes, total_pops, "elements were lost or duplicated!");
    println!("{}", "Stress test validation passed!".green().bold());
}

/// Run a quick verification test with fewer operations.
fn quick_verification_test() {
    println!("{}", "\nRunning quick verification test...".yellow().bold());

    let queue = Arc::new(MpmcQueue::new(4));
    let operations = 50;

    let queue_clone = Arc::clone(&queue);
    let push_thread = thread::spawn(move || {
        for i in 0..operations {
            queue_clone.push(i);
        }
    });
    push_thread.join().expect("push thread panicked");

    assert_eq!(queue.size(), operations as isize);
    println!("Pushed {} items successfully", operations);

    let mut popped = 0;
    while queue.pop().is_some() {
        popped += 1;
    }

    assert_eq!(popped, operations);
    assert_eq!(queue.size(), 0);
    println!("{}", "Quick verification test passed!".green().bold());
}
